use glam::UVec2;
use std::fmt;
use std::str::FromStr;

/// NVENC rejects frames wider or taller than this.
const NVENC_MAX_DIMENSION: u32 = 4096;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Codec {
    /// VP9 with alpha in a WebM container.
    Vp9,
    H264,
    /// H.264 through NVENC, falling back to libx264 for oversized frames.
    H264Nv,
    /// QuickTime Animation, lossless with alpha.
    Mov,
}

impl Codec {
    pub fn extension(self) -> &'static str {
        match self {
            Codec::Vp9 => "vp9.webm",
            Codec::H264 | Codec::H264Nv => "mp4",
            Codec::Mov => "mov",
        }
    }

    /// Name of the fingerprint file; both H.264 encoders produce the same output.
    pub fn hash_name(self) -> &'static str {
        match self {
            Codec::Vp9 => "vp9",
            Codec::H264 | Codec::H264Nv => "h264",
            Codec::Mov => "mov",
        }
    }

    /// Output-side ffmpeg arguments for a video scaled to `size`.
    pub fn output_args(self, size: UVec2) -> Vec<String> {
        let mut args: Vec<String> = match self {
            Codec::Vp9 => {
                let (bitrate, minrate, maxrate) = if size.x < 1280 || size.y < 720 {
                    (1024, 512, 1485)
                } else {
                    (1800, 900, 2610)
                };
                vec![
                    "-c:v".into(),
                    "libvpx-vp9".into(),
                    "-pix_fmt".into(),
                    "yuva420p".into(),
                    "-b:v".into(),
                    format!("{bitrate}k"),
                    "-minrate".into(),
                    format!("{minrate}k"),
                    "-maxrate".into(),
                    format!("{maxrate}k"),
                    "-crf".into(),
                    "31".into(),
                    "-tile-columns".into(),
                    "2".into(),
                    "-threads".into(),
                    "4".into(),
                    "-f".into(),
                    "webm".into(),
                ]
            }
            Codec::H264 => h264_args("libx264"),
            Codec::H264Nv => {
                if size.x > NVENC_MAX_DIMENSION || size.y > NVENC_MAX_DIMENSION {
                    log::warn!(
                        "{}x{} is too large for NVENC, falling back to libx264",
                        size.x,
                        size.y
                    );
                    h264_args("libx264")
                } else {
                    h264_args("h264_nvenc")
                }
            }
            Codec::Mov => vec!["-c:v".into(), "qtrle".into()],
        };
        args.push("-vf".into());
        args.push(format!("scale={}:{}", size.x, size.y));
        args.push("-an".into());
        args
    }
}

fn h264_args(encoder: &str) -> Vec<String> {
    [
        "-c:v",
        encoder,
        "-crf",
        "23",
        "-profile:v",
        "high",
        "-level",
        "4.0",
        "-pix_fmt",
        "yuv420p",
        "-movflags",
        "+faststart",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vp9" => Ok(Codec::Vp9),
            "h264" => Ok(Codec::H264),
            "h264nv" => Ok(Codec::H264Nv),
            "mov" => Ok(Codec::Mov),
            _ => Err(format!(
                "unknown codec '{s}' (expected vp9, h264, h264nv or mov)"
            )),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Codec::Vp9 => "vp9",
            Codec::H264 => "h264",
            Codec::H264Nv => "h264nv",
            Codec::Mov => "mov",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(codec: Codec, w: u32, h: u32) -> String {
        codec.output_args(UVec2::new(w, h)).join(" ")
    }

    #[test]
    fn vp9_bitrate_drops_below_hd() {
        let hd = joined(Codec::Vp9, 1920, 1080);
        assert!(hd.starts_with("-c:v libvpx-vp9 -pix_fmt yuva420p -b:v 1800k -minrate 900k -maxrate 2610k"));
        assert!(hd.contains("-crf 31 -tile-columns 2 -threads 4 -f webm"));
        assert!(hd.ends_with("-vf scale=1920:1080 -an"));

        let small = joined(Codec::Vp9, 1280, 700);
        assert!(small.contains("-b:v 1024k -minrate 512k -maxrate 1485k"));
    }

    #[test]
    fn h264_variants() {
        let x264 = joined(Codec::H264, 1920, 1080);
        assert_eq!(
            x264,
            "-c:v libx264 -crf 23 -profile:v high -level 4.0 -pix_fmt yuv420p -movflags +faststart -vf scale=1920:1080 -an"
        );
        assert!(joined(Codec::H264Nv, 4096, 4096).starts_with("-c:v h264_nvenc"));
        assert!(joined(Codec::H264Nv, 4097, 1080).starts_with("-c:v libx264"));
    }

    #[test]
    fn mov_is_lossless_animation() {
        assert_eq!(joined(Codec::Mov, 640, 480), "-c:v qtrle -vf scale=640:480 -an");
    }

    #[test]
    fn names_and_extensions() {
        assert_eq!(Codec::Vp9.extension(), "vp9.webm");
        assert_eq!(Codec::H264Nv.extension(), "mp4");
        assert_eq!(Codec::H264Nv.hash_name(), "h264");
        assert_eq!(Codec::Mov.hash_name(), "mov");
        assert_eq!("H264NV".parse::<Codec>(), Ok(Codec::H264Nv));
        assert!("av1".parse::<Codec>().is_err());
        assert_eq!(Codec::H264Nv.to_string(), "h264nv");
    }
}

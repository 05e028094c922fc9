//! Affine math, ear-clipping triangulation and convex clipping of triangle meshes.

pub(crate) const DEG_RAD: f32 = std::f32::consts::PI / 180.0;
pub(crate) const RAD_DEG: f32 = 180.0 / std::f32::consts::PI;

pub(crate) fn sin_deg(degrees: f32) -> f32 {
    (degrees * DEG_RAD).sin()
}

pub(crate) fn cos_deg(degrees: f32) -> f32 {
    (degrees * DEG_RAD).cos()
}

/// Wraps an angle in degrees to the shortest equivalent in [-180, 180].
pub fn wrap_degrees(r: f32) -> f32 {
    let turns = 16384 - (16384.499999999996_f64 - f64::from(r) / 360.0) as i32;
    r - (turns * 360) as f32
}

/// 2x3 affine transform: `[a b x; c d y]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Affine2 {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub x: f32,
    pub y: f32,
}

impl Default for Affine2 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine2 {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        x: 0.0,
        y: 0.0,
    };

    pub fn transform_point(&self, p: [f32; 2]) -> [f32; 2] {
        [
            self.a * p[0] + self.b * p[1] + self.x,
            self.c * p[0] + self.d * p[1] + self.y,
        ]
    }

    pub fn transform_vector(&self, v: [f32; 2]) -> [f32; 2] {
        [self.a * v[0] + self.b * v[1], self.c * v[0] + self.d * v[1]]
    }

    pub fn determinant(&self) -> f32 {
        self.a * self.d - self.b * self.c
    }

    /// Inverse mapping of `transform_point`; `None` for a singular matrix.
    pub fn inverse_transform_point(&self, p: [f32; 2]) -> Option<[f32; 2]> {
        let det = self.determinant();
        if det == 0.0 {
            return None;
        }
        let inv = 1.0 / det;
        let x = p[0] - self.x;
        let y = p[1] - self.y;
        Some([
            (x * self.d - y * self.b) * inv,
            (y * self.a - x * self.c) * inv,
        ])
    }

    /// `self * other`: applies `other` first.
    pub fn then(&self, other: &Affine2) -> Affine2 {
        Affine2 {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            x: self.a * other.x + self.b * other.y + self.x,
            y: self.c * other.x + self.d * other.y + self.y,
        }
    }
}

pub(crate) fn points_from_flat(flat: &[f32]) -> Vec<[f32; 2]> {
    flat.chunks_exact(2).map(|p| [p[0], p[1]]).collect()
}

#[derive(Default)]
pub(crate) struct Triangulator;

impl Triangulator {
    /// Ear-clips a simple polygon into triangle indices.
    pub(crate) fn triangulate(&self, polygon: &[[f32; 2]]) -> Vec<u16> {
        let mut remaining: Vec<usize> = (0..polygon.len()).collect();
        if remaining.len() < 3 {
            return Vec::new();
        }
        let mut concave: Vec<bool> = (0..remaining.len())
            .map(|i| is_reflex(polygon, &remaining, i))
            .collect();
        let mut triangles = Vec::with_capacity((remaining.len() - 2) * 3);

        while remaining.len() > 3 {
            let n = remaining.len();
            let ear = find_ear(polygon, &remaining, &concave);

            triangles.push(remaining[(n + ear - 1) % n] as u16);
            triangles.push(remaining[ear] as u16);
            triangles.push(remaining[(ear + 1) % n] as u16);

            remaining.remove(ear);
            concave.remove(ear);

            let n = remaining.len();
            let before = (n + ear - 1) % n;
            let after = if ear == n { 0 } else { ear };
            concave[before] = is_reflex(polygon, &remaining, before);
            concave[after] = is_reflex(polygon, &remaining, after);
        }

        triangles.extend([remaining[2] as u16, remaining[0] as u16, remaining[1] as u16]);
        triangles
    }

    /// Greedily merges a triangulation back into convex polygons.
    pub(crate) fn decompose(&self, polygon: &[[f32; 2]], triangles: &[u16]) -> Vec<Vec<[f32; 2]>> {
        let mut polys: Vec<Vec<[f32; 2]>> = Vec::new();
        let mut poly_indices: Vec<Vec<usize>> = Vec::new();

        let mut current: Vec<[f32; 2]> = Vec::new();
        let mut current_indices: Vec<usize> = Vec::new();
        let mut fan_base: Option<usize> = None;
        let mut last_winding = 0;

        for tri in triangles.chunks_exact(3) {
            let (t1, t2, t3) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let (p1, p2, p3) = (polygon[t1], polygon[t2], polygon[t3]);

            // Extend the current fan when the new vertex keeps it convex.
            if fan_base == Some(t1) && current.len() >= 2 {
                let n = current.len();
                let w1 = winding(current[n - 2], current[n - 1], p3);
                let w2 = winding(p3, current[0], current[1]);
                if w1 == last_winding && w2 == last_winding {
                    current.push(p3);
                    current_indices.push(t3);
                    continue;
                }
            }

            if !current.is_empty() {
                polys.push(std::mem::take(&mut current));
                poly_indices.push(std::mem::take(&mut current_indices));
            }
            current = vec![p1, p2, p3];
            current_indices = vec![t1, t2, t3];
            last_winding = winding(p1, p2, p3);
            fan_base = Some(t1);
        }
        if !current.is_empty() {
            polys.push(current);
            poly_indices.push(current_indices);
        }

        // Absorb leftover triangles that share the closing edge of a polygon.
        for i in 0..polys.len() {
            let (Some(&first_index), Some(&last_index)) =
                (poly_indices[i].first(), poly_indices[i].last())
            else {
                continue;
            };
            let n = polys[i].len();
            let mut prev_prev = polys[i][n - 2];
            let mut prev = polys[i][n - 1];
            let first = polys[i][0];
            let second = polys[i][1];
            let base_winding = winding(prev_prev, prev, first);

            let mut other = 0;
            while other < polys.len() {
                let candidate = &poly_indices[other];
                if other == i
                    || candidate.len() != 3
                    || candidate[0] != first_index
                    || candidate[1] != last_index
                {
                    other += 1;
                    continue;
                }
                let p3 = polys[other][2];
                let extra_index = candidate[2];
                if winding(prev_prev, prev, p3) == base_winding
                    && winding(p3, first, second) == base_winding
                {
                    polys[other].clear();
                    poly_indices[other].clear();
                    polys[i].push(p3);
                    poly_indices[i].push(extra_index);
                    prev_prev = prev;
                    prev = p3;
                    other = 0;
                    continue;
                }
                other += 1;
            }
        }

        polys.into_iter().filter(|p| !p.is_empty()).collect()
    }
}

fn find_ear(polygon: &[[f32; 2]], remaining: &[usize], concave: &[bool]) -> usize {
    let n = remaining.len();
    let mut previous = n - 1;
    let mut i = 0;
    let mut next = 1;
    loop {
        if !concave[i] {
            let p1 = polygon[remaining[previous]];
            let p2 = polygon[remaining[i]];
            let p3 = polygon[remaining[next]];
            let mut other = (next + 1) % n;
            let mut blocked = false;
            while other != previous {
                if concave[other] {
                    let v = polygon[remaining[other]];
                    if positive_area(p3, p1, v) && positive_area(p1, p2, v) && positive_area(p2, p3, v)
                    {
                        blocked = true;
                        break;
                    }
                }
                other = (other + 1) % n;
            }
            if !blocked {
                return i;
            }
        }

        if next == 0 {
            // No clean ear; fall back to the last convex vertex.
            while i > 0 && concave[i] {
                i -= 1;
            }
            return i;
        }
        previous = i;
        i = next;
        next = (next + 1) % n;
    }
}

fn positive_area(p1: [f32; 2], p2: [f32; 2], p3: [f32; 2]) -> bool {
    p1[0] * (p3[1] - p2[1]) + p2[0] * (p1[1] - p3[1]) + p3[0] * (p2[1] - p1[1]) >= 0.0
}

fn is_reflex(polygon: &[[f32; 2]], remaining: &[usize], index: usize) -> bool {
    let n = remaining.len();
    let previous = polygon[remaining[(n + index - 1) % n]];
    let current = polygon[remaining[index]];
    let next = polygon[remaining[(index + 1) % n]];
    !positive_area(previous, current, next)
}

fn winding(p1: [f32; 2], p2: [f32; 2], p3: [f32; 2]) -> i32 {
    let px = p2[0] - p1[0];
    let py = p2[1] - p1[1];
    if p3[0] * py - p3[1] * px + px * p1[1] - p1[0] * py >= 0.0 {
        1
    } else {
        -1
    }
}

/// Reorders a polygon so its signed area is negative (clockwise in a y-up frame).
pub(crate) fn make_clockwise(polygon: &mut [[f32; 2]]) {
    let n = polygon.len();
    if n < 3 {
        return;
    }
    let mut area = polygon[n - 1][0] * polygon[0][1] - polygon[0][0] * polygon[n - 1][1];
    for pair in polygon.windows(2) {
        area += pair[0][0] * pair[1][1] - pair[1][0] * pair[0][1];
    }
    if area >= 0.0 {
        polygon.reverse();
    }
}

/// Geometry produced by clipping a mesh. Triangle indices address `positions`.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ClippedMesh {
    pub(crate) positions: Vec<[f32; 2]>,
    pub(crate) uvs: Vec<[f32; 2]>,
    pub(crate) triangles: Vec<u32>,
}

enum TriangleClip {
    Inside,
    Outside,
    Partial,
}

/// Clips attachment triangles against a clipping attachment's polygon, split into convex parts.
#[derive(Default)]
pub(crate) struct SkeletonClipper {
    triangulator: Triangulator,
    /// Convex parts, each closed by repeating its first point.
    polygons: Vec<Vec<[f32; 2]>>,
    end_slot: Option<usize>,
    input: Vec<[f32; 2]>,
    output: Vec<[f32; 2]>,
}

impl SkeletonClipper {
    /// Starts clipping with `polygon` (world space) until `end_slot` is drawn.
    /// Returns false when a clip is already active or the polygon is degenerate.
    pub(crate) fn clip_start(&mut self, polygon: &[[f32; 2]], end_slot: Option<usize>) -> bool {
        if self.is_clipping() || polygon.len() < 3 {
            return false;
        }
        let mut polygon = polygon.to_vec();
        make_clockwise(&mut polygon);
        let triangles = self.triangulator.triangulate(&polygon);
        let mut parts = self.triangulator.decompose(&polygon, &triangles);
        for part in &mut parts {
            make_clockwise(part);
            part.push(part[0]);
        }
        self.polygons = parts;
        self.end_slot = end_slot;
        self.is_clipping()
    }

    /// Ends the active clip if `slot` is its end slot.
    pub(crate) fn clip_end_with_slot(&mut self, slot: usize) {
        if self.is_clipping() && self.end_slot == Some(slot) {
            self.clip_end();
        }
    }

    pub(crate) fn clip_end(&mut self) {
        self.polygons.clear();
        self.end_slot = None;
        self.input.clear();
        self.output.clear();
    }

    pub(crate) fn is_clipping(&self) -> bool {
        !self.polygons.is_empty()
    }

    pub(crate) fn clip_triangles(
        &mut self,
        positions: &[[f32; 2]],
        uvs: &[[f32; 2]],
        triangles: &[u16],
    ) -> ClippedMesh {
        let mut out = ClippedMesh::default();

        'triangles: for tri in triangles.chunks_exact(3) {
            let corners = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let [p1, p2, p3] = corners.map(|i| positions[i]);
            let [uv1, uv2, uv3] = corners.map(|i| uvs[i]);

            for part in &self.polygons {
                let base = out.positions.len() as u32;
                match clip_triangle([p1, p2, p3], part, &mut self.input, &mut self.output) {
                    TriangleClip::Outside => continue,
                    TriangleClip::Inside => {
                        out.positions.extend([p1, p2, p3]);
                        out.uvs.extend([uv1, uv2, uv3]);
                        out.triangles.extend([base, base + 1, base + 2]);
                        continue 'triangles;
                    }
                    TriangleClip::Partial => {
                        // Barycentric coordinates of each clipped point against the source triangle.
                        let d0 = p2[1] - p3[1];
                        let d1 = p3[0] - p2[0];
                        let d2 = p1[0] - p3[0];
                        let d4 = p3[1] - p1[1];
                        let d = 1.0 / (d0 * d2 + d1 * (p1[1] - p3[1]));
                        for &[x, y] in &self.output {
                            let c0 = x - p3[0];
                            let c1 = y - p3[1];
                            let a = (d0 * c0 + d1 * c1) * d;
                            let b = (d4 * c0 + d2 * c1) * d;
                            let c = 1.0 - a - b;
                            out.positions.push([x, y]);
                            out.uvs.push([
                                uv1[0] * a + uv2[0] * b + uv3[0] * c,
                                uv1[1] * a + uv2[1] * b + uv3[1] * c,
                            ]);
                        }
                        let count = self.output.len() as u32;
                        for k in 1..count.saturating_sub(1) {
                            out.triangles.extend([base, base + k, base + k + 1]);
                        }
                    }
                }
            }
        }
        out
    }
}

/// Sutherland-Hodgman against one closed convex polygon. On `Partial` the clipped
/// polygon (open) is left in `output`.
fn clip_triangle(
    triangle: [[f32; 2]; 3],
    area: &[[f32; 2]],
    input: &mut Vec<[f32; 2]>,
    output: &mut Vec<[f32; 2]>,
) -> TriangleClip {
    let mut clipped = false;
    input.clear();
    input.extend([triangle[0], triangle[1], triangle[2], triangle[0]]);

    for edge in area.windows(2) {
        let [edge_x, edge_y] = edge[0];
        let ex = edge_x - edge[1][0];
        let ey = edge_y - edge[1][1];

        output.clear();
        for segment in input.windows(2) {
            let [x1, y1] = segment[0];
            let [x2, y2] = segment[1];
            let s1 = ey * (edge_x - x1) - ex * (edge_y - y1);
            let s2 = ey * (edge_x - x2) > ex * (edge_y - y2);

            if s1 > 0.0 {
                if s2 {
                    output.push([x2, y2]);
                    continue;
                }
                output.push(intersect_or_end([x1, y1], [x2, y2], s1, ex, ey));
            } else if s2 {
                let ix = x2 - x1;
                let iy = y2 - y1;
                let t = s1 / (ix * ey - iy * ex);
                if (0.0..=1.0).contains(&t) {
                    output.push([x1 + ix * t, y1 + iy * t]);
                    output.push([x2, y2]);
                } else {
                    output.push([x2, y2]);
                    continue;
                }
            }
            clipped = true;
        }

        if output.is_empty() {
            return TriangleClip::Outside;
        }
        let first = output[0];
        output.push(first);
        std::mem::swap(input, output);
    }

    if !clipped {
        return TriangleClip::Inside;
    }
    output.clear();
    output.extend_from_slice(&input[..input.len() - 1]);
    TriangleClip::Partial
}

fn intersect_or_end(p1: [f32; 2], p2: [f32; 2], s1: f32, ex: f32, ey: f32) -> [f32; 2] {
    let ix = p2[0] - p1[0];
    let iy = p2[1] - p1[1];
    let t = s1 / (ix * ey - iy * ex);
    if (0.0..=1.0).contains(&t) {
        [p1[0] + ix * t, p1[1] + iy * t]
    } else {
        p2
    }
}

use crate::{RenderError, RenderStats};
use glam::UVec2;
use spinevid::DrawList;
use spinevid_wgpu::{FrameRasterizer, PageSet};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// One rasterized frame: tightly packed RGBA8 rows, top row first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Turns a frame's draw list into pixels.
pub trait FrameRenderer: Sync {
    fn render(
        &self,
        canvas: UVec2,
        pages: &Arc<PageSet>,
        draw_list: DrawList,
    ) -> Result<Frame, RenderError>;

    fn stats(&self) -> Option<&RenderStats> {
        None
    }
}

/// A graphics context owned by one pool worker.
pub trait RasterBackend {
    fn rasterize(
        &mut self,
        pages: &PageSet,
        draw_list: &DrawList,
        canvas: UVec2,
    ) -> Result<Vec<u8>, RenderError>;
}

impl RasterBackend for FrameRasterizer {
    fn rasterize(
        &mut self,
        pages: &PageSet,
        draw_list: &DrawList,
        canvas: UVec2,
    ) -> Result<Vec<u8>, RenderError> {
        Ok(self.render(pages, draw_list, canvas.x, canvas.y)?)
    }
}

struct WorkItem {
    canvas: UVec2,
    pages: Arc<PageSet>,
    draw_list: DrawList,
    reply: SyncSender<Result<Frame, RenderError>>,
}

/// Fixed set of worker threads, each owning one backend created on that thread.
///
/// Callers block in [`FrameRenderer::render`] until a worker answers their item.
/// Dropping the pool closes the queue and joins the workers.
pub struct RendererPool {
    queue: Option<SyncSender<WorkItem>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<RenderStats>,
}

impl RendererPool {
    /// Spawns `threads` workers (at least one) and waits until every backend is ready.
    pub fn new<B, F>(threads: usize, factory: F) -> Result<Self, RenderError>
    where
        B: RasterBackend + 'static,
        F: Fn(usize) -> Result<B, RenderError> + Send + Sync + 'static,
    {
        let threads = threads.max(1);
        let (queue, work) = mpsc::sync_channel::<WorkItem>(threads * 2);
        let work = Arc::new(Mutex::new(work));
        let factory = Arc::new(factory);
        let stats = Arc::new(RenderStats::default());
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), RenderError>>();

        let mut pool = Self {
            queue: Some(queue),
            workers: Vec::with_capacity(threads),
            stats: Arc::clone(&stats),
        };
        for id in 0..threads {
            let work = Arc::clone(&work);
            let factory = Arc::clone(&factory);
            let stats = Arc::clone(&stats);
            let ready = ready_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("spinevid-raster-{id}"))
                .spawn(move || {
                    let backend = match factory(id) {
                        Ok(backend) => {
                            let _ = ready.send(Ok(()));
                            backend
                        }
                        Err(e) => {
                            let _ = ready.send(Err(e));
                            return;
                        }
                    };
                    drop(ready);
                    worker_loop(id, backend, &work, &stats);
                })?;
            pool.workers.push(handle);
        }
        drop(ready_tx);

        for _ in 0..threads {
            match ready_rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(RenderError::PoolClosed),
            }
        }
        log::debug!("renderer pool ready with {threads} workers");
        Ok(pool)
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

fn worker_loop<B: RasterBackend>(
    id: usize,
    mut backend: B,
    work: &Mutex<Receiver<WorkItem>>,
    stats: &RenderStats,
) {
    loop {
        let item = {
            let Ok(queue) = work.lock() else {
                return;
            };
            match queue.recv() {
                Ok(item) => item,
                Err(_) => break,
            }
        };

        let started = Instant::now();
        let result = backend
            .rasterize(&item.pages, &item.draw_list, item.canvas)
            .map(|pixels| Frame {
                width: item.canvas.x,
                height: item.canvas.y,
                pixels,
            });
        if result.is_ok() {
            stats.record_draw(started.elapsed());
        }
        // The caller may have given up waiting.
        let _ = item.reply.send(result);
    }
    log::debug!("raster worker {id} stopped");
}

impl FrameRenderer for RendererPool {
    fn render(
        &self,
        canvas: UVec2,
        pages: &Arc<PageSet>,
        draw_list: DrawList,
    ) -> Result<Frame, RenderError> {
        let queue = self.queue.as_ref().ok_or(RenderError::PoolClosed)?;
        let (reply, done) = mpsc::sync_channel(1);
        let started = Instant::now();
        queue
            .send(WorkItem {
                canvas,
                pages: Arc::clone(pages),
                draw_list,
                reply,
            })
            .map_err(|_| RenderError::PoolClosed)?;
        let frame = done.recv().map_err(|_| RenderError::PoolClosed)??;
        self.stats.record_round_trip(started.elapsed());
        Ok(frame)
    }

    fn stats(&self) -> Option<&RenderStats> {
        Some(&self.stats)
    }
}

impl Drop for RendererPool {
    fn drop(&mut self) {
        self.queue.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

//! Per-pipeline GLib main loop
//!
//! Every pipeline wrapper owns its own `MainContext`, so several receivers and
//! transmitters can run in one process without sharing the default context.
//! The bus watch and any idle sources are attached to that context and run on
//! the loop's worker thread.

use super::PipelineError;
use gstreamer as gst;
use gstreamer::prelude::*;
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// GLib main loop driving one pipeline's bus
pub struct EventLoop {
    name: String,
    context: glib::MainContext,
    main_loop: glib::MainLoop,
    bus_watch: glib::Source,
    failure: Arc<Mutex<Option<PipelineError>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    finished: Arc<LoopFinished>,
}

/// Set by the worker thread once `MainLoop::run` returns
#[derive(Default)]
struct LoopFinished {
    done: Mutex<bool>,
    cond: Condvar,
}

impl LoopFinished {
    fn reset(&self) {
        *self.done.lock() = false;
    }

    fn set(&self) {
        *self.done.lock() = true;
        self.cond.notify_all();
    }

    fn is_set(&self) -> bool {
        *self.done.lock()
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.cond.wait(&mut done);
        }
    }
}

impl EventLoop {
    /// Create the loop and attach a bus watch for `pipeline`
    pub fn new(name: &str, pipeline: &gst::Pipeline) -> Result<Self, PipelineError> {
        let context = glib::MainContext::new();
        let main_loop = glib::MainLoop::new(Some(&context), false);
        let failure = Arc::new(Mutex::new(None));

        let bus = pipeline
            .bus()
            .ok_or_else(|| PipelineError::LoopFailed(format!("{} has no bus", name)))?;

        let watch_loop = main_loop.clone();
        let watch_failure = failure.clone();
        let pipeline_name = name.to_string();
        let bus_watch = bus.create_watch(Some("videolink-bus"), glib::Priority::DEFAULT, move |_, msg| {
            handle_message(&pipeline_name, msg, &watch_loop, &watch_failure);
            glib::ControlFlow::Continue
        });
        bus_watch.attach(Some(&context));

        Ok(Self {
            name: name.to_string(),
            context,
            main_loop,
            bus_watch,
            failure,
            worker: Mutex::new(None),
            finished: Arc::new(LoopFinished::default()),
        })
    }

    /// Context that callbacks of this pipeline are dispatched on
    pub fn context(&self) -> &glib::MainContext {
        &self.context
    }

    /// Start the loop on a worker thread. Returns `false` if already started.
    pub fn spawn(&self) -> Result<bool, PipelineError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(false);
        }

        let main_loop = self.main_loop.clone();
        let name = self.name.clone();
        let finished = self.finished.clone();
        finished.reset();
        let handle = thread::Builder::new()
            .name(format!("{}-loop", self.name))
            .spawn(move || {
                info!("Running {} event loop", name);
                main_loop.run();
                info!("{} event loop returned", name);
                finished.set();
            })
            .map_err(|e| PipelineError::LoopFailed(format!("Failed to spawn loop thread: {}", e)))?;

        *worker = Some(handle);
        Ok(true)
    }

    /// Whether the worker thread is alive
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some() && !self.finished.is_set()
    }

    /// Stop the loop and join the worker thread. Threads blocked in
    /// [`EventLoop::wait`] return once the loop has ended.
    pub fn quit(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };

        // The loop may not have started iterating yet; a quit scheduled on
        // its own context is seen either way.
        let main_loop = self.main_loop.clone();
        let source = glib::source::idle_source_new(
            Some("videolink-quit"),
            glib::Priority::HIGH,
            move || {
                main_loop.quit();
                glib::ControlFlow::Break
            },
        );
        source.attach(Some(&self.context));
        self.main_loop.quit();

        if handle.join().is_err() {
            error!("{} event loop thread panicked", self.name);
        }
        source.destroy();
    }

    /// Block until the loop ends on its own or through [`EventLoop::quit`],
    /// then report any error posted on the bus.
    ///
    /// The worker handle stays in place so `quit` from another thread can
    /// still stop the loop and join it.
    pub fn wait(&self) -> Result<(), PipelineError> {
        if self.worker.lock().is_some() {
            self.finished.wait();
        }
        match self.failure() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// First error posted on the bus, if any
    pub fn failure(&self) -> Option<PipelineError> {
        self.failure.lock().clone()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.quit();
        self.bus_watch.destroy();
    }
}

fn handle_message(
    name: &str,
    msg: &gst::Message,
    main_loop: &glib::MainLoop,
    failure: &Mutex<Option<PipelineError>>,
) {
    use gst::MessageView;

    match msg.view() {
        MessageView::Error(err) => {
            let text = format!(
                "{} from {}: {}",
                err.error(),
                err.src()
                    .map(|s| s.path_string().to_string())
                    .unwrap_or_else(|| name.to_string()),
                err.debug().map(|d| d.to_string()).unwrap_or_default()
            );
            error!("{} pipeline error: {}", name, text);
            failure.lock().get_or_insert(PipelineError::Bus(text));
            main_loop.quit();
        }
        MessageView::Eos(..) => {
            info!("{} pipeline reached end of stream", name);
            main_loop.quit();
        }
        MessageView::Warning(w) => {
            warn!("{} pipeline warning: {}", name, w.error());
        }
        MessageView::StateChanged(s) => {
            if let Some(src) = msg.src() {
                if src.name().as_str() == name {
                    debug!("{} state {:?} -> {:?}", name, s.old(), s.current());
                }
            }
        }
        _ => {}
    }
}

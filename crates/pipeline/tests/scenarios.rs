use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use pipeline::{
    pump, AnalysisStage, ChannelLayout, CompletionNotifier, ContextError, ContextState,
    DisplaySurface, Frame, FrameCallback, FramePipeline, FrameSource, Lifecycle, LoopExit,
    PixelView, RecordingSink, RenderContext, RunStatus, Session, SinkState, Stages, TextureHandle,
    TextureSlots, TextureStage,
};

const SIDE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Resize(u32, u32),
    MakeCurrent,
    Pull(u64),
    Upload(u8),
    Process(u8),
    Present,
    Extract,
    SetGeometry(u32, u32),
    Begin,
    Write(u8),
    End,
}

type Log = Rc<RefCell<Vec<Event>>>;
type Slots = Rc<RefCell<TextureSlots<Vec<u8>>>>;

fn count(log: &Log, wanted: &Event) -> usize {
    log.borrow().iter().filter(|event| *event == wanted).count()
}

fn count_matching(log: &Log, predicate: impl Fn(&Event) -> bool) -> usize {
    log.borrow().iter().filter(|event| predicate(event)).count()
}

fn writes(log: &Log) -> Vec<u8> {
    log.borrow()
        .iter()
        .filter_map(|event| match event {
            Event::Write(marker) => Some(*marker),
            _ => None,
        })
        .collect()
}

struct ScriptedSource {
    total: u64,
    log: Log,
}

impl FrameSource for ScriptedSource {
    fn pull(&mut self, index: u64) -> Result<Option<Frame>> {
        self.log.borrow_mut().push(Event::Pull(index));
        if index >= self.total {
            return Ok(None);
        }
        let data = vec![index as u8; (SIDE * SIDE * 4) as usize];
        Ok(Some(Frame::new(index, SIDE, SIDE, ChannelLayout::Rgba8, data)?))
    }
}

struct SlotUpload {
    slots: Slots,
    slot: u32,
    fail_at: Option<u64>,
    log: Log,
}

impl TextureStage for SlotUpload {
    fn upload(&mut self, frame: &Frame, layout: ChannelLayout) -> Result<TextureHandle> {
        if self.fail_at == Some(frame.index()) {
            bail!("texture upload rejected");
        }
        self.log.borrow_mut().push(Event::Upload(frame.data()[0]));
        let mut slots = self.slots.borrow_mut();
        *slots.payload_mut(self.slot)? = Some(frame.data().to_vec());
        Ok(slots.publish(self.slot, frame.geometry(), layout)?)
    }
}

struct CopyAnalysis {
    slots: Slots,
    slot: u32,
    last: Option<TextureHandle>,
    log: Log,
}

impl AnalysisStage for CopyAnalysis {
    fn process(&mut self, input: &TextureHandle) -> Result<TextureHandle> {
        let mut slots = self.slots.borrow_mut();
        let pixels = slots.resolve(input)?.clone();
        self.log.borrow_mut().push(Event::Process(pixels[0]));
        *slots.payload_mut(self.slot)? = Some(pixels);
        let output = slots.publish(self.slot, input.geometry(), ChannelLayout::Rgba8)?;
        self.last = Some(output);
        Ok(output)
    }

    fn extract_pixels(&mut self, deliver: &mut dyn FnMut(PixelView<'_>)) -> Result<()> {
        self.log.borrow_mut().push(Event::Extract);
        let Some(handle) = self.last else {
            bail!("nothing processed yet");
        };
        let slots = self.slots.borrow();
        let pixels = slots.resolve(&handle)?;
        deliver(PixelView::new(handle.geometry(), handle.layout(), pixels));
        Ok(())
    }
}

struct LoggingDisplay {
    log: Log,
}

impl DisplaySurface for LoggingDisplay {
    fn present(&mut self, _texture: &TextureHandle) -> Result<()> {
        self.log.borrow_mut().push(Event::Present);
        Ok(())
    }
}

#[derive(Default, Clone)]
struct SinkFlags {
    ends: Arc<AtomicUsize>,
    finalized: Arc<AtomicBool>,
}

struct MockSink {
    state: SinkState,
    fail_begin: bool,
    healthy_writes: Option<usize>,
    written: usize,
    flags: SinkFlags,
    log: Log,
}

impl MockSink {
    fn new(log: &Log, flags: &SinkFlags) -> Self {
        Self {
            state: SinkState::Unopened,
            fail_begin: false,
            healthy_writes: None,
            written: 0,
            flags: flags.clone(),
            log: log.clone(),
        }
    }
}

impl RecordingSink for MockSink {
    fn set_geometry(&mut self, width: u32, height: u32) -> Result<()> {
        self.log.borrow_mut().push(Event::SetGeometry(width, height));
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        self.log.borrow_mut().push(Event::Begin);
        if self.fail_begin {
            self.state = SinkState::Failed;
            bail!("codec unavailable");
        }
        self.state = SinkState::Recording;
        Ok(())
    }

    fn good(&self) -> bool {
        self.state == SinkState::Recording
    }

    fn write(&mut self, pixels: PixelView<'_>) -> Result<()> {
        assert!(self.good(), "write on a sink that is not recording");
        self.log.borrow_mut().push(Event::Write(pixels.data[0]));
        self.written += 1;
        if self.healthy_writes == Some(self.written) {
            self.state = SinkState::Failed;
        }
        Ok(())
    }

    fn end(self: Box<Self>, done: CompletionNotifier) {
        self.log.borrow_mut().push(Event::End);
        self.flags.ends.fetch_add(1, Ordering::SeqCst);
        let finalized = self.flags.finalized.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(25));
            finalized.store(true, Ordering::SeqCst);
            done.notify();
        });
    }

    fn state(&self) -> SinkState {
        self.state
    }
}

struct SpinContext {
    lifecycle: Lifecycle,
    callbacks: u64,
    /// Simulates the user closing the window after this many callbacks.
    close_after: Option<u64>,
    log: Log,
}

impl SpinContext {
    fn new(log: &Log) -> Self {
        let mut lifecycle = Lifecycle::new();
        lifecycle.ready();
        Self {
            lifecycle,
            callbacks: 0,
            close_after: None,
            log: log.clone(),
        }
    }
}

impl RenderContext for SpinContext {
    type Device = ();

    fn state(&self) -> ContextState {
        self.lifecycle.state()
    }

    fn make_current(&mut self) -> Result<()> {
        self.lifecycle.mark_current()?;
        self.log.borrow_mut().push(Event::MakeCurrent);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.lifecycle.ensure_resizable()?;
        self.log.borrow_mut().push(Event::Resize(width, height));
        Ok(())
    }

    fn run(&mut self, frame: &mut FrameCallback<'_>) -> Result<LoopExit> {
        self.lifecycle.begin_run()?;
        let callbacks = &mut self.callbacks;
        let result = match self.close_after {
            None => pump(&mut || {
                *callbacks += 1;
                frame()
            })
            .map(|_| LoopExit::Exhausted),
            Some(limit) => {
                let mut exit = Ok(LoopExit::Closed);
                while *callbacks < limit {
                    *callbacks += 1;
                    match frame() {
                        Ok(true) => {}
                        Ok(false) => {
                            exit = Ok(LoopExit::Exhausted);
                            break;
                        }
                        Err(err) => {
                            exit = Err(err);
                            break;
                        }
                    }
                }
                exit
            }
        };
        self.lifecycle.finish_run();
        result
    }
}

struct Harness {
    log: Log,
    flags: SinkFlags,
    display: bool,
    fail_upload_at: Option<u64>,
}

impl Harness {
    fn new() -> Self {
        Self {
            log: Log::default(),
            flags: SinkFlags::default(),
            display: false,
            fail_upload_at: None,
        }
    }

    fn source(&self, total: u64) -> Box<dyn FrameSource> {
        Box::new(ScriptedSource {
            total,
            log: self.log.clone(),
        })
    }

    fn sink(&self) -> MockSink {
        MockSink::new(&self.log, &self.flags)
    }

    fn stages(&self) -> Stages {
        let slots: Slots = Rc::default();
        let (input, output) = {
            let mut table = slots.borrow_mut();
            (table.allocate(), table.allocate())
        };
        let display: Option<Box<dyn DisplaySurface>> = if self.display {
            Some(Box::new(LoggingDisplay {
                log: self.log.clone(),
            }))
        } else {
            None
        };
        Stages {
            textures: Box::new(SlotUpload {
                slots: slots.clone(),
                slot: input,
                fail_at: self.fail_upload_at,
                log: self.log.clone(),
            }),
            analysis: Box::new(CopyAnalysis {
                slots,
                slot: output,
                last: None,
                log: self.log.clone(),
            }),
            display,
        }
    }

    fn run(
        &self,
        context: &mut SpinContext,
        total: u64,
        sink: Option<MockSink>,
    ) -> Result<RunStatus> {
        let sink = sink.map(|sink| Box::new(sink) as Box<dyn RecordingSink>);
        Session::new(self.source(total))
            .with_sink(sink)
            .run(context, |_context, (), _geometry| Ok(self.stages()))
    }
}

#[test]
fn ten_frames_without_display_or_sink() {
    let harness = Harness::new();
    let mut context = SpinContext::new(&harness.log);

    let status = harness.run(&mut context, 10, None).unwrap();

    assert_eq!(
        status,
        RunStatus::Completed {
            frames: 10,
            exit: LoopExit::Exhausted
        }
    );
    assert_eq!(status.exit_code(), 0);
    assert_eq!(count_matching(&harness.log, |e| matches!(e, Event::Pull(_))), 11);
    assert_eq!(context.callbacks, 11);
    assert_eq!(count(&harness.log, &Event::Extract), 0);
    assert_eq!(context.state(), ContextState::Stopped);
}

#[test]
fn empty_source_reports_no_frames_without_sizing() {
    let harness = Harness::new();
    let mut context = SpinContext::new(&harness.log);
    let sink = harness.sink();

    let built = Cell::new(false);
    let status = Session::new(harness.source(0))
        .with_sink(Some(Box::new(sink) as Box<dyn RecordingSink>))
        .run(&mut context, |_context, (), _geometry| {
            built.set(true);
            Ok(harness.stages())
        })
        .unwrap();

    assert_eq!(status, RunStatus::NoFrames);
    assert_ne!(status.exit_code(), 0);
    assert_eq!(*harness.log.borrow(), vec![Event::Pull(0)]);
    assert!(!built.get());
    assert_eq!(context.state(), ContextState::Ready);
    assert_eq!(harness.flags.ends.load(Ordering::SeqCst), 0);
}

#[test]
fn recording_sink_receives_every_frame_then_finalizes_once() {
    let harness = Harness::new();
    let mut context = SpinContext::new(&harness.log);

    let status = harness
        .run(&mut context, 5, Some(harness.sink()))
        .unwrap();

    assert_eq!(status.exit_code(), 0);
    assert_eq!(writes(&harness.log), vec![0, 1, 2, 3, 4]);
    assert_eq!(count(&harness.log, &Event::End), 1);
    assert_eq!(harness.flags.ends.load(Ordering::SeqCst), 1);
    assert!(
        harness.flags.finalized.load(Ordering::SeqCst),
        "run returned before the sink finished flushing"
    );

    let log = harness.log.borrow();
    let geometry = log
        .iter()
        .position(|e| *e == Event::SetGeometry(SIDE, SIDE))
        .unwrap();
    let begin = log.iter().position(|e| *e == Event::Begin).unwrap();
    assert!(geometry < begin);
    assert_eq!(log.last(), Some(&Event::End));
}

#[test]
fn window_close_still_finalizes_the_sink_before_returning() {
    let harness = Harness::new();
    let mut context = SpinContext::new(&harness.log);
    context.close_after = Some(3);

    let status = harness
        .run(&mut context, 10, Some(harness.sink()))
        .unwrap();

    assert_eq!(
        status,
        RunStatus::Completed {
            frames: 3,
            exit: LoopExit::Closed
        }
    );
    assert_eq!(status.exit_code(), 0);
    assert_eq!(writes(&harness.log), vec![0, 1, 2]);
    assert_eq!(count(&harness.log, &Event::End), 1);
    assert_eq!(harness.flags.ends.load(Ordering::SeqCst), 1);
    assert!(
        harness.flags.finalized.load(Ordering::SeqCst),
        "run returned before the sink finished flushing"
    );
    assert_eq!(harness.log.borrow().last(), Some(&Event::End));
    assert_eq!(context.state(), ContextState::Stopped);
}

#[test]
fn failed_begin_disables_recording_only() {
    let harness = Harness::new();
    let mut context = SpinContext::new(&harness.log);
    let mut sink = harness.sink();
    sink.fail_begin = true;

    let status = harness.run(&mut context, 5, Some(sink)).unwrap();

    assert_eq!(
        status,
        RunStatus::Completed {
            frames: 5,
            exit: LoopExit::Exhausted
        }
    );
    assert!(writes(&harness.log).is_empty());
    assert_eq!(count(&harness.log, &Event::Extract), 0);
    assert_eq!(count(&harness.log, &Event::End), 0);
    assert_eq!(count_matching(&harness.log, |e| matches!(e, Event::Pull(_))), 6);
    assert_eq!(context.callbacks, 6);
}

#[test]
fn unhealthy_sink_stops_receiving_but_display_continues() {
    let mut harness = Harness::new();
    harness.display = true;
    let mut context = SpinContext::new(&harness.log);
    let mut sink = harness.sink();
    sink.healthy_writes = Some(2);

    harness.run(&mut context, 5, Some(sink)).unwrap();

    assert_eq!(writes(&harness.log), vec![0, 1]);
    assert_eq!(count(&harness.log, &Event::Extract), 2);
    assert_eq!(count(&harness.log, &Event::Present), 5);
    assert_eq!(
        count_matching(&harness.log, |e| matches!(e, Event::Process(_))),
        5
    );
    assert_eq!(harness.flags.ends.load(Ordering::SeqCst), 1);
}

#[test]
fn frames_are_fully_processed_in_pull_order() {
    let mut harness = Harness::new();
    harness.display = true;
    let mut context = SpinContext::new(&harness.log);

    harness
        .run(&mut context, 3, Some(harness.sink()))
        .unwrap();

    let log = harness.log.borrow();
    let start = log.iter().position(|e| *e == Event::Begin).unwrap() + 1;
    let mut expected = Vec::new();
    for index in 0..3u8 {
        if index > 0 {
            expected.push(Event::Pull(u64::from(index)));
        }
        expected.extend([
            Event::Upload(index),
            Event::Process(index),
            Event::Present,
            Event::Extract,
            Event::Write(index),
        ]);
    }
    expected.push(Event::Pull(3));
    expected.push(Event::End);
    assert_eq!(&log[start..], expected.as_slice());
}

#[test]
fn setup_happens_after_probe_and_before_the_loop() {
    let harness = Harness::new();
    let mut context = SpinContext::new(&harness.log);

    harness.run(&mut context, 1, None).unwrap();

    let log = harness.log.borrow();
    assert_eq!(
        &log[..3],
        &[Event::Pull(0), Event::Resize(SIDE, SIDE), Event::MakeCurrent]
    );
}

#[test]
fn upload_failure_is_fatal_but_sink_is_still_finalized() {
    let mut harness = Harness::new();
    harness.fail_upload_at = Some(3);
    let mut context = SpinContext::new(&harness.log);

    let err = harness
        .run(&mut context, 5, Some(harness.sink()))
        .unwrap_err();

    assert!(format!("{err:#}").contains("texture upload rejected"));
    assert_eq!(writes(&harness.log), vec![0, 1, 2]);
    assert_eq!(harness.flags.ends.load(Ordering::SeqCst), 1);
    assert!(harness.flags.finalized.load(Ordering::SeqCst));
}

#[test]
fn stopped_context_cannot_run_again() {
    let harness = Harness::new();
    let mut context = SpinContext::new(&harness.log);
    harness.run(&mut context, 2, None).unwrap();

    let err = harness.run(&mut context, 2, None).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ContextError>(),
        Some(&ContextError::Stopped)
    );
}

#[test]
fn exhausted_pipeline_never_pulls_again() {
    let harness = Harness::new();
    let stages = harness.stages();
    let mut pipeline = FramePipeline::new(harness.source(1), stages.textures, stages.analysis)
        .with_layout(ChannelLayout::Rgba8);

    assert!(pipeline.step().unwrap());
    assert!(!pipeline.step().unwrap());
    assert!(!pipeline.step().unwrap());
    assert!(!pipeline.step().unwrap());

    assert_eq!(pipeline.frames_processed(), 1);
    assert_eq!(
        count_matching(&harness.log, |e| matches!(e, Event::Pull(_))),
        2
    );
}

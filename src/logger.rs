pub const REG_TAR: &str = "reg";
pub const BUFFER_TAR: &str = "buffer";
pub const FACTORY_TAR: &str = "factory";
const HEX_DUMP_MAX: usize = 16;

use std::fmt::LowerHex;
use std::sync::Mutex;
use tracing::{Level, Subscriber};
use tracing_chrome::{ChromeLayer, ChromeLayerBuilder};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{filter, fmt, registry, EnvFilter};

pub fn statics<S>(file: &'static str) -> (ChromeLayer<S>, tracing_chrome::FlushGuard)
where
    S: Subscriber + for<'span> registry::LookupSpan<'span> + Send + Sync,
{
    ChromeLayerBuilder::new()
        .include_args(true)
        .file(&format!("{}.trace.json", file))
        .include_locations(false)
        .build()
}

pub fn default<S>() -> filter::Filtered<
    fmt::Layer<
        S,
        fmt::format::Pretty,
        fmt::format::Format<fmt::format::Pretty>,
        tracing_appender::non_blocking::NonBlocking,
    >,
    EnvFilter,
    S,
>
where
    S: Subscriber + for<'span> registry::LookupSpan<'span> + Send + Sync,
{
    let (non_blocking, _guard) = tracing_appender::non_blocking(std::io::stdout());
    std::mem::forget(_guard);
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(""));
    fmt::layer()
        .pretty()
        .with_writer(non_blocking)
        .with_filter(filter_layer)
}

static LOGGER: Mutex<Option<Option<tracing_chrome::FlushGuard>>> = Mutex::new(None);

/// Installs the global subscriber once. With `statics`, register operations
/// are also traced to `reg_model.trace.json`.
pub fn logger_en(statics_en: bool) {
    let mut logger_guard = LOGGER.lock().unwrap();
    if logger_guard.is_some() {
        return;
    }
    let logger = tracing_subscriber::registry().with(default());
    if statics_en {
        let filter = filter::filter_fn(|metadata| {
            metadata.target() == REG_TAR || metadata.target() == BUFFER_TAR
        });
        let (statics, guard) = statics("reg_model");
        let _ = logger.with(statics.with_filter(filter)).try_init();
        *logger_guard = Some(Some(guard));
    } else {
        let _ = logger.try_init();
        *logger_guard = Some(None)
    }
}

/// Flushes the chrome trace, if any.
pub fn logger_dis() {
    LOGGER.lock().unwrap().take();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegOp {
    RegRead,
    RegWrite,
    StreamRead,
    StreamWrite,
    FieldGet,
    FieldSet,
    BufferReadBegin,
    BufferReadEnd,
    BufferWriteBegin,
    BufferWriteEnd,
}

impl RegOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegOp::RegRead => "reg read",
            RegOp::RegWrite => "reg write",
            RegOp::StreamRead => "stream read",
            RegOp::StreamWrite => "stream write",
            RegOp::FieldGet => "field get",
            RegOp::FieldSet => "field set",
            RegOp::BufferReadBegin => "buffer read begin",
            RegOp::BufferReadEnd => "buffer read end",
            RegOp::BufferWriteBegin => "buffer write begin",
            RegOp::BufferWriteEnd => "buffer write end",
        }
    }

    pub fn read(recording: bool) -> Self {
        if recording {
            RegOp::StreamRead
        } else {
            RegOp::RegRead
        }
    }

    pub fn write(recording: bool) -> Self {
        if recording {
            RegOp::StreamWrite
        } else {
            RegOp::RegWrite
        }
    }
}

fn level_to_u8(level: Level) -> u8 {
    match level {
        Level::ERROR => 0,
        Level::WARN => 1,
        Level::INFO => 2,
        Level::DEBUG => 3,
        _ => 4,
    }
}

fn u8_to_level(v: u8) -> Level {
    match v {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Register operation log gate. Owned by whoever builds the register graph and
/// shared with every register it creates; the threshold is the most verbose
/// level still emitted.
#[derive(Debug)]
pub struct LogContext {
    threshold: std::sync::atomic::AtomicU8,
}

impl LogContext {
    pub fn new(level: Level) -> Self {
        LogContext {
            threshold: std::sync::atomic::AtomicU8::new(level_to_u8(level)),
        }
    }

    pub fn level(&self) -> Level {
        u8_to_level(self.threshold.load(std::sync::atomic::Ordering::SeqCst))
    }

    pub fn set_level(&self, level: Level) {
        self.threshold
            .store(level_to_u8(level), std::sync::atomic::Ordering::SeqCst)
    }

    /// Changes the threshold until the returned guard drops.
    pub fn scoped(&self, level: Level) -> LevelGuard<'_> {
        let saved = self.level();
        self.set_level(level);
        LevelGuard { ctx: self, saved }
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level()
    }

    pub fn reg_event(&self, op: RegOp, name: &str, offset: u64, value: u64) {
        if !self.enabled(Level::DEBUG) {
            return;
        }
        tracing::debug!(
            target: REG_TAR,
            op = op.as_str(),
            reg = name,
            offset = format_args!("{:#x}", offset),
            value = format_args!("{:#x}", value)
        );
    }

    pub fn field_event(&self, op: RegOp, name: &str, value: u64) {
        if !self.enabled(Level::TRACE) {
            return;
        }
        tracing::trace!(
            target: REG_TAR,
            op = op.as_str(),
            reg = name,
            value = format_args!("{:#x}", value)
        );
    }

    pub fn buffer_event<T: LowerHex>(&self, op: RegOp, name: &str, offset: usize, data: &[T]) {
        if !self.enabled(Level::DEBUG) {
            return;
        }
        tracing::debug!(
            target: BUFFER_TAR,
            op = op.as_str(),
            reg = name,
            offset,
            len = data.len(),
            data = %hex_dump(data)
        );
    }
}

impl Default for LogContext {
    fn default() -> Self {
        LogContext::new(Level::INFO)
    }
}

pub struct LevelGuard<'a> {
    ctx: &'a LogContext,
    saved: Level,
}

impl<'a> Drop for LevelGuard<'a> {
    fn drop(&mut self) {
        self.ctx.set_level(self.saved)
    }
}

pub fn hex_dump<T: LowerHex>(data: &[T]) -> String {
    let mut s = data
        .iter()
        .take(HEX_DUMP_MAX)
        .map(|d| format!("{:#x}", d))
        .collect::<Vec<_>>()
        .join(" ");
    if data.len() > HEX_DUMP_MAX {
        s.push_str(" ...");
    }
    s
}

/// Collects the `op` field of every event seen while `run` executes.
#[cfg(test)]
pub(crate) mod capture {
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer};
    use tracing_subscriber::prelude::*;

    #[derive(Clone, Default)]
    pub struct OpCapture(Arc<Mutex<Vec<String>>>);

    struct OpVisitor<'a>(&'a mut Option<String>);

    impl<'a> Visit for OpVisitor<'a> {
        fn record_str(&mut self, field: &Field, value: &str) {
            if field.name() == "op" {
                *self.0 = Some(value.to_string());
            }
        }
        fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
    }

    impl<S: Subscriber> Layer<S> for OpCapture {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut op = None;
            event.record(&mut OpVisitor(&mut op));
            if let Some(op) = op {
                self.0.lock().unwrap().push(op);
            }
        }
    }

    impl OpCapture {
        pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
            let subscriber = tracing_subscriber::registry().with(self.clone());
            tracing::subscriber::with_default(subscriber, f)
        }

        pub fn ops(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        pub fn ops_with_prefix(&self, prefix: &str) -> Vec<String> {
            self.ops()
                .into_iter()
                .filter(|op| op.starts_with(prefix))
                .collect()
        }
    }
}

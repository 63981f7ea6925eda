use std::sync::Arc;

use tracing::Level;
use tracing_core::{
    span::{Attributes, Id, Record},
    subscriber::Interest,
    Event, Metadata, Subscriber,
};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

use crate::{
    data::{AMap, RawMap},
    fields::SpanPairs,
    globals::{snapshot, Globals},
    level::Severity,
    visitor::LagerVisitor,
};

/// A [`Layer`] that writes `tracing` events as log lines.
///
/// Event fields become pairs, the `message` field becomes the line's
/// message and the fields of every span the event is in are added as
/// context, outermost span first. Events are only recorded when the matching
/// level is enabled.
///
/// ```
/// use tracing_subscriber::layer::SubscriberExt;
///
/// let subscriber = tracing_subscriber::registry().with(lager::LagerLayer::new());
/// tracing::subscriber::with_default(subscriber, || {
///     tracing::warn!(user = "tye", "Logged in");
/// });
/// ```
#[derive(Clone)]
pub struct LagerLayer {
    globals: Option<Arc<Globals>>,
    with_target: bool,
    log_internal_errors: bool,
}

impl Default for LagerLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl LagerLayer {
    /// Writes through the process-wide configuration in effect for each
    /// event.
    pub fn new() -> Self {
        Self {
            globals: None,
            with_target: true,
            log_internal_errors: false,
        }
    }

    /// Always writes through `globals`, ignoring the process-wide
    /// configuration.
    pub fn with_globals(globals: Arc<Globals>) -> Self {
        Self {
            globals: Some(globals),
            ..Self::new()
        }
    }

    /// Whether the event's target is logged as the module name. On by
    /// default.
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Reports problems with span bookkeeping on stderr.
    pub fn log_internal_errors(mut self, log_internal_errors: bool) -> Self {
        self.log_internal_errors = log_internal_errors;
        self
    }

    fn globals(&self) -> Arc<Globals> {
        self.globals.clone().unwrap_or_else(snapshot)
    }
}

/// The severity `tracing` levels are written at.
pub fn severity_for(level: &Level) -> Severity {
    if *level == Level::ERROR {
        Severity::Fail
    } else if *level == Level::WARN {
        Severity::Warn
    } else if *level == Level::INFO {
        Severity::Info
    } else if *level == Level::DEBUG {
        Severity::Debug
    } else {
        Severity::Trace
    }
}

impl<S> Layer<S> for LagerLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    // Levels can be switched at any time so nothing may be cached.
    fn register_callsite(&self, _metadata: &'static Metadata<'static>) -> Interest {
        Interest::sometimes()
    }

    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        metadata.is_span()
            || self
                .globals()
                .lager(severity_for(metadata.level()))
                .enabled()
    }

    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            if self.log_internal_errors {
                eprintln!("[lager] Span not found, this is a bug.");
            }
            return;
        };

        let mut visitor = LagerVisitor::default();
        attrs.record(&mut visitor);
        let pairs = AMap::pairs(visitor.into_tokens());
        let mut extensions = span.extensions_mut();
        if extensions.get_mut::<SpanPairs>().is_none() {
            extensions.insert(SpanPairs { pairs });
        } else if self.log_internal_errors {
            eprintln!("[lager] Span {:?} already has pairs, ignoring: {attrs:?}", attrs.metadata().name());
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            if self.log_internal_errors {
                eprintln!("[lager] Span not found, this is a bug.");
            }
            return;
        };

        let mut extensions = span.extensions_mut();
        let Some(fields) = extensions.get_mut::<SpanPairs>() else {
            if self.log_internal_errors {
                eprintln!("[lager] Span was created but has no pairs, this is a bug and some fields may have been lost.");
            }
            return;
        };

        let mut visitor = LagerVisitor::default();
        values.record(&mut visitor);
        fields.pairs = fields.pairs.add_pairs(visitor.into_tokens());
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let globals = self.globals();
        let lager = globals.lager(severity_for(event.metadata().level()));
        if !lager.enabled() {
            return;
        }

        let mut context = AMap::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(fields) = span.extensions().get::<SpanPairs>() {
                    context = context.merge(&fields.pairs);
                }
            }
        }
        let mut lager = lager.with(&[context]);
        if self.with_target {
            lager = lager.with_module(event.metadata().target());
        }

        let mut visitor = LagerVisitor::default();
        event.record(&mut visitor);
        let pairs = RawMap(visitor.tokens);
        match visitor.message {
            Some(message) => lager.mmap(&message, pairs),
            None => lager.map(pairs),
        }
    }
}

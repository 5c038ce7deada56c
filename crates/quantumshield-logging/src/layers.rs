//! Custom tracing layers for QuantumShield

use tracing::{Subscriber, span};
use tracing_subscriber::{
    fmt::{
        self,
        format::{Format, Json, JsonFields},
    },
    layer::{Context, Layer},
    registry::LookupSpan,
};

use crate::config::JsonlConfig;
use crate::context::{IdentityContextData, IdentityContextGuard};

/// Layer that attaches the active identity context to new spans
///
/// When an [`IdentityContextGuard`] is active, every span created in its scope
/// carries an [`IdentityContextExtension`].
pub struct IdentityContextLayer;

impl IdentityContextLayer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IdentityContextLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct IdentityContextExtension {
    pub data: IdentityContextData,
}

impl<S> Layer<S> for IdentityContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(identity_ctx) = IdentityContextGuard::current() {
                span.extensions_mut()
                    .insert(IdentityContextExtension { data: identity_ctx });
            }
        }
    }
}

/// Create a JSONL formatting layer
///
/// Used for both file output and JSONL console output.
pub fn jsonl_layer<S, W>(
    writer: W,
    config: &JsonlConfig,
) -> fmt::Layer<S, JsonFields, Format<Json>, W>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'writer> fmt::MakeWriter<'writer> + 'static,
{
    fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(config.include_spans)
        .flatten_event(config.flatten_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_writer(writer)
}

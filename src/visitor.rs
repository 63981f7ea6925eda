use std::{error::Error, fmt};

use tracing_core::field;

use crate::value::Value;

const MESSAGE: &str = "message";

/// Collects the fields of a span or event as alternating keys and values.
///
/// The `message` field of an event is kept apart so it can become the
/// line's message.
#[derive(Debug, Default)]
pub(crate) struct LagerVisitor {
    pub(crate) tokens: Vec<Value>,
    pub(crate) message: Option<String>,
}

impl LagerVisitor {
    fn push(&mut self, field: &field::Field, value: Value) {
        self.tokens.push(Value::from(field.name()));
        self.tokens.push(value);
    }

    /// All fields as tokens, with the message as an ordinary pair.
    pub(crate) fn into_tokens(mut self) -> Vec<Value> {
        if let Some(message) = self.message.take() {
            self.tokens.insert(0, Value::from(MESSAGE));
            self.tokens.insert(1, Value::from(message));
        }
        self.tokens
    }
}

impl field::Visit for LagerVisitor {
    fn record_f64(&mut self, field: &field::Field, value: f64) {
        self.push(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &field::Field, value: i64) {
        self.push(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &field::Field, value: u64) {
        self.push(field, Value::from(value));
    }

    fn record_i128(&mut self, field: &field::Field, value: i128) {
        self.push(field, Value::from(value));
    }

    fn record_u128(&mut self, field: &field::Field, value: u128) {
        self.push(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &field::Field, value: bool) {
        self.push(field, Value::from(value));
    }

    fn record_str(&mut self, field: &field::Field, value: &str) {
        if field.name() == MESSAGE {
            self.message = Some(value.to_owned());
        } else {
            self.push(field, Value::from(value));
        }
    }

    fn record_error(&mut self, field: &field::Field, value: &(dyn Error + 'static)) {
        self.push(field, Value::from(value.to_string()));
    }

    fn record_debug(&mut self, field: &field::Field, value: &dyn fmt::Debug) {
        if field.name() == MESSAGE {
            self.message = Some(format!("{value:?}"));
        } else {
            self.push(field, Value::from(format!("{value:?}")));
        }
    }
}

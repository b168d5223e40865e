use crate::types::AssistantMessage;
use std::collections::BTreeMap;

/// Receives message snapshots from the reducer, in emission order.
///
/// Calls are fire-and-forget. `update_message` always carries a full replacement
/// value for an id previously passed to `create_message`. `delete_message` is
/// only called for ids that were created; an identity change that happens
/// before the first emission never reaches the sink.
pub trait MessageSink {
    fn create_message(&mut self, message: &AssistantMessage);
    fn update_message(&mut self, message: &AssistantMessage);
    fn delete_message(&mut self, id: &str);
}

impl<S: MessageSink + ?Sized> MessageSink for &mut S {
    fn create_message(&mut self, message: &AssistantMessage) {
        (**self).create_message(message)
    }

    fn update_message(&mut self, message: &AssistantMessage) {
        (**self).update_message(message)
    }

    fn delete_message(&mut self, id: &str) {
        (**self).delete_message(id)
    }
}

impl<S: MessageSink + ?Sized> MessageSink for Box<S> {
    fn create_message(&mut self, message: &AssistantMessage) {
        (**self).create_message(message)
    }

    fn update_message(&mut self, message: &AssistantMessage) {
        (**self).update_message(message)
    }

    fn delete_message(&mut self, id: &str) {
        (**self).delete_message(id)
    }
}

/// Sink built from three closures.
pub struct CallbackSink<C, U, D> {
    create: C,
    update: U,
    delete: D,
}

impl<C, U, D> CallbackSink<C, U, D>
where
    C: FnMut(&AssistantMessage),
    U: FnMut(&AssistantMessage),
    D: FnMut(&str),
{
    pub fn new(create: C, update: U, delete: D) -> Self {
        Self {
            create,
            update,
            delete,
        }
    }
}

impl<C, U, D> MessageSink for CallbackSink<C, U, D>
where
    C: FnMut(&AssistantMessage),
    U: FnMut(&AssistantMessage),
    D: FnMut(&str),
{
    fn create_message(&mut self, message: &AssistantMessage) {
        (self.create)(message)
    }

    fn update_message(&mut self, message: &AssistantMessage) {
        (self.update)(message)
    }

    fn delete_message(&mut self, id: &str) {
        (self.delete)(id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Create(AssistantMessage),
    Update(AssistantMessage),
    Delete(String),
}

impl SinkCall {
    pub fn message_id(&self) -> &str {
        match self {
            Self::Create(m) | Self::Update(m) => &m.id,
            Self::Delete(id) => id,
        }
    }
}

/// In-memory store keyed by message id, plus the full call log.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: BTreeMap<String, AssistantMessage>,
    calls: Vec<SinkCall>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&AssistantMessage> {
        self.messages.get(id)
    }

    pub fn messages(&self) -> impl Iterator<Item = &AssistantMessage> {
        self.messages.values()
    }

    pub fn calls(&self) -> &[SinkCall] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl MessageSink for MemorySink {
    fn create_message(&mut self, message: &AssistantMessage) {
        if self.messages.contains_key(&message.id) {
            tracing::warn!("[SINK] create for existing message {}", message.id);
        }
        self.messages.insert(message.id.clone(), message.clone());
        self.calls.push(SinkCall::Create(message.clone()));
    }

    fn update_message(&mut self, message: &AssistantMessage) {
        if !self.messages.contains_key(&message.id) {
            tracing::warn!("[SINK] update for unknown message {}", message.id);
        }
        self.messages.insert(message.id.clone(), message.clone());
        self.calls.push(SinkCall::Update(message.clone()));
    }

    fn delete_message(&mut self, id: &str) {
        self.messages.remove(id);
        self.calls.push(SinkCall::Delete(id.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_tracks_state_and_calls() {
        let mut sink = MemorySink::new();
        let mut msg = AssistantMessage::new("m1");
        sink.create_message(&msg);
        msg.context.push(serde_json::json!(1));
        sink.update_message(&msg);
        assert_eq!(sink.get("m1"), Some(&msg));
        sink.delete_message("m1");
        assert!(sink.is_empty());
        let ids: Vec<&str> = sink.calls().iter().map(|c| c.message_id()).collect();
        assert_eq!(ids, vec!["m1", "m1", "m1"]);
        assert!(matches!(sink.calls()[2], SinkCall::Delete(_)));
    }

    fn forward<S: MessageSink>(mut sink: S, message: &AssistantMessage) {
        sink.create_message(message);
        sink.update_message(message);
    }

    #[test]
    fn test_callback_sink_through_mut_ref() {
        let mut log = Vec::new();
        {
            let mut sink = CallbackSink::new(
                |m: &AssistantMessage| log.push(format!("create:{}", m.id)),
                |_: &AssistantMessage| {},
                |_: &str| {},
            );
            forward(&mut sink, &AssistantMessage::new("x"));
        }
        assert_eq!(log, vec!["create:x".to_string()]);
    }
}

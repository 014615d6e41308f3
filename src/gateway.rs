use serde::ser::{SerializeMap as _, SerializeStruct as _};

/// A single attribute write addressed to one device behind the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub attribute: String,
    pub value: u32,
}

impl ControlMessage {
    pub fn new(attribute: impl Into<String>, value: u32) -> Self {
        Self { attribute: attribute.into(), value }
    }
}

impl serde::Serialize for ControlMessage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.attribute, &self.value)?;
        map.end()
    }
}

/// Whatever carries control messages to the gateway.
///
/// Entities own their gateway handle and call into it synchronously. Retrying and timeouts are
/// the implementation's business.
pub trait Gateway {
    type Error: std::error::Error + Send + Sync + 'static;
    fn send(&mut self, did: &str, message: ControlMessage) -> Result<(), Self::Error>;
}

/// A control message together with its destination, serialized as the gateway's `write`
/// command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCommand {
    pub did: String,
    pub message: ControlMessage,
}

impl serde::Serialize for WriteCommand {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("WriteCommand", 3)?;
        s.serialize_field("cmd", "write")?;
        s.serialize_field("did", &self.did)?;
        s.serialize_field("params", std::slice::from_ref(&self.message))?;
        s.end()
    }
}

/// Queues the commands up for somebody else to deliver.
impl Gateway for Vec<WriteCommand> {
    type Error = std::convert::Infallible;
    fn send(&mut self, did: &str, message: ControlMessage) -> Result<(), Self::Error> {
        tracing::debug!(
            did,
            attribute = message.attribute.as_str(),
            value = message.value,
            "queued write"
        );
        self.push(WriteCommand { did: did.to_string(), message });
        Ok(())
    }
}

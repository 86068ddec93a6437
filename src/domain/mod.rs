pub mod events;

pub use events::{
    CloudEventEnvelope, DocumentEvent, DocumentEventData, DocumentEventKind, DocumentFields,
};

// Reference catalog — example figures supplied to retrieval and planning

mod store;

pub use store::{ReferenceRecord, ReferenceStore, INDEX_FILE};

//! Everything to do with pack files: the wire format itself (`data`), the sorted digest
//! lookup sidecar (`index`), the delta instruction codec (`delta`), pairing the two into a
//! resolvable unit (`bundle`), aggregating many such pairs (`engine`), the LRUs and
//! allocation arena interposed across all of it (`cache`), and the streaming encode/decode
//! entry points used by ingestion and repack (`data::input`, `data::output`).
pub mod bundle;
pub mod cache;
pub mod data;
pub mod delta;
pub mod engine;
pub mod index;

//! Custom resource types and wire formats shared by every Eno controller.
//!
//! This crate carries no reconciliation logic: it only defines the
//! persisted object schemas (`Synthesizer`, `Composition`, `ResourceSlice`,
//! `Symphony`), the `eno.azure.io/*` annotation keys, and the `ResourceList`
//! wire contract exchanged with the synthesizer-execution subsystem.

pub mod annotations;
pub mod composition;
pub mod duration;
pub mod refs;
pub mod resource_list;
pub mod resource_slice;
pub mod status;
pub mod symphony;
pub mod synthesizer;

pub use composition::{
    Binding, Composition, CompositionSpec, CompositionStatus, InputRevision, Result as SynthesisResult,
    Severity, Synthesis,
};
pub use duration::KubeDuration;
pub use refs::ObjectRef;
pub use resource_list::ResourceList;
pub use resource_slice::{ResourceSlice, ResourceSliceSpec, ResourceSliceStatus, ResourceState, SliceResource};
pub use status::SimplifiedStatus;
pub use symphony::{Symphony, SymphonySpec, SymphonyStatus, Variation};
pub use synthesizer::{InputRef, Synthesizer, SynthesizerSpec};

#[path = "support/memory_harness.rs"]
mod memory_harness;

#[path = "memory/compaction_flow.rs"]
mod compaction_flow;
#[path = "memory/concept_rebuild.rs"]
mod concept_rebuild;
#[path = "memory/reflection_flow.rs"]
mod reflection_flow;
#[path = "memory/search_parity.rs"]
mod search_parity;

//! Scenario tests
//!
//! Tests are organized by the story they tell:
//!
//! - `inheritance`: an operator creates an Organization and Deployments and
//!   watches registers flow from parent to child
//! - `lifecycle`: finalizers, deletion and namespace cleanup
//! - `lookup`: consumers resolve registers and locate registry backends

mod fixtures;
mod inheritance;

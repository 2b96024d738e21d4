//! Use Cases Layer - Application Workflows
//!
//! Orchestrates domain logic with port interfaces to implement
//! the relay's workflows.
//!
//! Use cases:
//! - `AcquisitionPipeline`: Graded per-pair batch fetching with retry
//! - `FeedCycle`: Cold start and steady-state cycle orchestration
//! - `Scheduler`: Minute-aligned trigger with overlap suppression

pub mod acquisition;
pub mod cycle;
pub mod scheduler;

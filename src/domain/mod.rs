// Genome representation and flat codec
pub mod codec;
pub mod genome;

// Evaluation results and fitness scoring
pub mod evaluation;
pub mod fitness;

// Generation cohorts
pub mod generation;

// Deployment lifecycle
pub mod deployment;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;

// Evaluation fan-out
pub mod evaluation;

// Genetic algorithm: operators and the generation lifecycle
pub mod evolution;

// Live feedback and deployment gating
pub mod live;

// Top-level loop
pub mod supervisor;

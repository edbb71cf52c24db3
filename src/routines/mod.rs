// Routines for the initial vector and matrix
pub mod initialization;
// Armijo backtracking
pub mod line_search;
// Dense linear algebra helpers
pub mod linalg;
// Routines for logging
pub mod logger;
// Loss and gradient
pub mod loss;
// Routines for output
pub mod output;
// Vector-to-matrix map
pub mod phi;
// Routines for settings
pub mod settings;

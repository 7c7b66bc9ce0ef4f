//! Small building blocks shared by the tree and the document.

pub mod clock;

pub use clock::LamportClock;

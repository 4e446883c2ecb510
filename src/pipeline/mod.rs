pub mod cancel;
pub mod chain;
pub mod pipe;
pub mod runtime;

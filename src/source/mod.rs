pub mod fs;
pub mod stdin;

pub use fs::FsSource;
pub use stdin::StdinSource;

mod hash;
mod hostname;
mod line_reader;
mod workspace;

pub use hash::{fingerprint, stat, FileFingerprint, FileStat};
pub use hostname::hostname;
pub use line_reader::LineReader;
pub use workspace::{expand_tilde, resolve_data_dir};

pub mod toml_loader;

pub use toml_loader::{load_all_exams, load_exam, parse_exam};

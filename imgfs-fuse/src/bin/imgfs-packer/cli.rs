use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Directory whose regular files are copied into the image root
    #[arg(long, short)]
    pub source: PathBuf,

    /// Image file to create, overwritten if it exists
    #[arg(long, short)]
    pub out: PathBuf,

    /// Number of descriptors in the image
    #[arg(long, short, default_value_t = 128)]
    pub descriptors: u16,
}

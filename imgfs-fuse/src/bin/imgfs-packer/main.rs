mod cli;

use clap::Parser;
use cli::Cli;
use imgfs::FileSystem;
use imgfs_fuse::pack_dir;

fn main() -> imgfs::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    println!("source={:?}\nout={:?}", cli.source, cli.out);

    let mut fs = FileSystem::format(&cli.out, cli.descriptors)?;
    for name in pack_dir(&mut fs, &cli.source)? {
        println!("file: {name:?}");
    }
    println!("free blocks: {}", fs.free_blocks()?);

    fs.sync()
}

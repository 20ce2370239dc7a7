use crate::config;
use crate::error::CliResult;

pub fn run() -> CliResult<()> {
    let extid_dir = config::init_extid_dir()?;
    println!("Initialized extid in {}", extid_dir.display());
    Ok(())
}

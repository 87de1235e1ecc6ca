//! The `checksum` command: hash a local file the way the verifier would.

use anyhow::Result;
use std::path::Path;

use swiftget_core::checksum;

pub fn run(path: &Path, with_md5: bool) -> Result<()> {
    let sha256 = checksum::sha256_path(path)?;
    println!("sha256  {}  {}", sha256, path.display());
    if with_md5 {
        let md5 = checksum::md5_path(path)?;
        println!("md5     {}  {}", md5, path.display());
    }
    Ok(())
}

//! df - report filesystem disk space usage

use crate::args::Args;
use crate::error::Result;
use crate::syscalls;
use alloc::format;

pub fn main(argv: &'static [&'static str]) -> Result<i32> {
    let args = Args::parse(argv, "h")?;
    
    let human_readable = args.has_option('h');
    
    // Print header
    if human_readable {
        syscalls::write(1, b"Filesystem      Size  Used Avail Use% Mounted on\n");
    } else {
        syscalls::write(1, b"Filesystem     1K-blocks    Used Available Use% Mounted on\n");
    }
    
    // TODO: Implement actual filesystem querying
    // For now, show placeholder data
    
    // Root filesystem (mfs_ram)
    let line = if human_readable {
        "mfs_ram         10M   2M    8M  20% /\n"
    } else {
        "mfs_ram        10240  2048  8192  20% /\n"
    };
    syscalls::write(1, line.as_bytes());
    
    // Example mounted filesystem
    let line = if human_readable {
        "mfs_disk       512M  64M  448M  13% /mnt\n"
    } else {
        "mfs_disk      524288 65536 458752  13% /mnt\n"
    };
    syscalls::write(1, line.as_bytes());
    
    Ok(0)
}

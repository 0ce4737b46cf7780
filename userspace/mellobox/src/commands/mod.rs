//! Command implementations for mellobox utilities

pub mod cat;
pub mod cp;
pub mod df;
pub mod echo;
pub mod false_cmd;
pub mod grep;
pub mod kill;
pub mod ls;
pub mod mkdir;
pub mod mount;
pub mod mv;
pub mod ps;
pub mod pwd;
pub mod rm;
pub mod stat;
pub mod touch;
pub mod true_cmd;
pub mod umount;

mod doctor_cmd;
mod profile_cmd;

pub use doctor_cmd::*;
pub use profile_cmd::*;

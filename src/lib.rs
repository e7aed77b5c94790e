/// Print to stderr unless `$quiet` is set.
#[macro_export]
macro_rules! progress {
    ($quiet:expr) => {
        if !$quiet {
            eprintln!();
        }
    };
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            eprintln!($($arg)*);
        }
    };
}

pub mod consensus;
pub mod coverage;
pub mod errors;
pub mod output;
pub mod pipeline;
pub mod reference;
pub mod significance;
pub mod strand_bias;
pub mod types;
pub mod window;

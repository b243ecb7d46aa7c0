//! Command line entry point of the upload stresstest.
//!
//! See `uploadstress --help` for the available options.
#![warn(missing_docs)]

fn main() -> anyhow::Result<()> {
    uploadstress::cli::execute()
}

/// Exit payload returned by CLI subcommands.
#[derive(Debug)]
pub struct CmdExit {
    /// Process exit code (see the `exitcode` crate).
    pub code: i32,
    /// Optional message printed to stderr before exiting.
    pub message: Option<String>,
}

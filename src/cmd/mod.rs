/*!
Command layer.

  args.rs  (ForwardArgs + Config + resolver)
  run.rs   (main flow: connect, spawn, forward, shut down)

Exit codes:
  0  help / version / command output fully forwarded
  1  any error of the main flow
  4  usage error (missing command, topic or broker URL)
*/

pub mod args;
pub mod run;

pub use args::{Config, ForwardArgs, ResolveError};
pub use run::execute_run;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 4;

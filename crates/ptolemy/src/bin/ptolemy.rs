//! The stock `ptolemy` binary: serves documents whose only handlers are
//! the builtin ones, and checks documents.

use std::process::ExitCode;

use ptolemy::core::HandlerTable;

#[tokio::main]
async fn main() -> ExitCode {
    ptolemy::cli::run(HandlerTable::new()).await
}

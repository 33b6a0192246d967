use std::process::ExitCode;

fn main() -> ExitCode {
    formchain_cli::run()
}

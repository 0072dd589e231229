use std::process::ExitCode;

fn main() -> ExitCode {
    mailsmith_cli::run()
}

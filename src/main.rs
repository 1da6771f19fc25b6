use std::process::ExitCode;

fn main() -> ExitCode {
    match streamgrab::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

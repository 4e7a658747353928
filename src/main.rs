fn main() {
    if handle_cli_flags() {
        return;
    }

    if let Err(err) = videoreel::run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> bool {
    let mut saw_flag = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("Videoreel {}", videoreel::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "Videoreel - An endless reel of subreddit videos.\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n\n{}\n\nConfiguration: {}",
                    videoreel::app::HELP,
                    config_location()
                );
                saw_flag = true;
            }
            _ => {}
        }
    }
    saw_flag
}

fn config_location() -> String {
    videoreel::config::default_path()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "~/.config/videoreel/config.yaml".to_string())
}

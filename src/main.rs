use workspaces_sd::launch::RootCommand;

fn main() {
    let cmd: RootCommand = argh::from_env();

    if let Err(code) = cmd.run() {
        std::process::exit(code);
    }
}

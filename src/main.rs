fn main() -> std::process::ExitCode {
    photodrop_lib::run()
}

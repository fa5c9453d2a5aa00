fn main() -> Result<(), Box<dyn std::error::Error>> {
    driftchat::cli::main()
}

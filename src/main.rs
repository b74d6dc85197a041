use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    shama::cli::main()
}

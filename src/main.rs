use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    ir_scope_builder::driver::main()
}

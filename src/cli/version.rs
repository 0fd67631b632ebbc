/// Display version information
pub fn execute() {
    println!("timefund {}", env!("CARGO_PKG_VERSION"));
    println!("Operator CLI for TimeFund custodial time-lock funds");
}

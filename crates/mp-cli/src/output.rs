use serde::Serialize;

/// Operation results go to stdout as pretty JSON; progress messages stay
/// on stderr.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

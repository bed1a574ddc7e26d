use tracing::Level;

/// Install a fmt subscriber at the given level.
///
/// Returns false when a global subscriber was already set, which is the
/// usual case inside a host application that configured its own.
pub fn init(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let _ = init(Level::DEBUG);
        assert!(!init(Level::DEBUG));
    }
}

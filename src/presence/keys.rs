const PREFIX: &str = "presence:moment";

/// Separates key segments; never allowed inside a room id
pub const SEPARATOR: char = ':';

/// Members currently in the room
pub fn presence(room: &str) -> String {
    format!("{PREFIX}:{room}")
}

/// Last-seen marker of one participant
pub fn heartbeat(room: &str, participant: &str) -> String {
    format!("{PREFIX}:{room}:user:{participant}:ts")
}

/// Approximate distinct visitors of a window
pub fn unique(room: &str, window: &str) -> String {
    format!("{PREFIX}:{room}:hll:{window}")
}

/// Highest concurrent count of a window
pub fn peak(room: &str, window: &str) -> String {
    format!("{PREFIX}:{room}:peak:{window}")
}

/// Simulation ownership token
pub fn simulation_lock(room: &str) -> String {
    format!("{PREFIX}:{room}:sim:lock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_share_the_room_namespace() {
        assert_eq!(presence("abc"), "presence:moment:abc");
        assert_eq!(heartbeat("abc", "u1"), "presence:moment:abc:user:u1:ts");
        assert_eq!(
            peak("abc", "2024-05-01T10:00:00.000Z"),
            "presence:moment:abc:peak:2024-05-01T10:00:00.000Z"
        );
        assert_eq!(simulation_lock("abc"), "presence:moment:abc:sim:lock");
    }
}

use rand::Rng;
use rand::distr::Alphanumeric;

/// Length of a public access token. 16 symbols of a 62-letter alphabet is
/// ~95 bits of entropy.
pub const ACCESS_TOKEN_LEN: usize = 16;

/// Draw a fresh opaque access token. It carries no structure and is unrelated
/// to the event's primary key; uniqueness is enforced on insert.
pub fn generate_access_token() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(ACCESS_TOKEN_LEN)
        .map(char::from)
        .collect()
}

//! Buyer credential generation
//!
//! Issued on buyer approval: a short human-readable account identifier and
//! an initial password. Both are drawn from the OS entropy source. The
//! identifier alphabet excludes lookalike characters (0/O, 1/I/L) because
//! buyers read these off an email and type them back in.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::data::AccountsRepository;
use crate::error::{AppError, Result};

const ID_PREFIX: &str = "TP-";
const ID_SUFFIX_LEN: usize = 8;
const ID_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

const PASSWORD_LEN: usize = 16;
const LOWER: &[u8] = b"abcdefghjkmnpqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%^&*-_+=";

/// Attempts before giving up on a collision-free identifier.
const MAX_ID_ATTEMPTS: usize = 10;

/// Credentials issued to a newly approved buyer.
///
/// The plaintext password exists only in this struct, long enough to hash
/// and notify; it is never persisted.
#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    pub user_account_id: String,
    pub password: String,
}

fn pick(rng: &mut OsRng, alphabet: &[u8]) -> char {
    alphabet[rng.gen_range(0..alphabet.len())] as char
}

/// Generate one candidate account identifier, e.g. `TP-K7M2XR4Q`.
pub fn generate_account_id() -> String {
    let mut rng = OsRng;
    let mut id = String::with_capacity(ID_PREFIX.len() + ID_SUFFIX_LEN);
    id.push_str(ID_PREFIX);
    for _ in 0..ID_SUFFIX_LEN {
        id.push(pick(&mut rng, ID_ALPHABET));
    }
    id
}

/// Generate a candidate identifier not currently assigned to any account.
///
/// The pre-insert probe is advisory; the UNIQUE column is the real guard
/// and callers retry on a unique violation.
///
/// # Errors
/// [`AppError::ExhaustedRetries`] after [`MAX_ID_ATTEMPTS`] collisions.
pub async fn generate_unique_account_id(accounts: &dyn AccountsRepository) -> Result<String> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let candidate = generate_account_id();
        if !accounts.user_account_id_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    Err(AppError::ExhaustedRetries)
}

/// Generate an initial password: 16 characters containing at least one
/// lowercase letter, one uppercase letter, one digit, and one symbol.
pub fn generate_password() -> String {
    let mut rng = OsRng;
    let mut chars = Vec::with_capacity(PASSWORD_LEN);

    // One from each class guarantees the composition rule
    chars.push(pick(&mut rng, LOWER));
    chars.push(pick(&mut rng, UPPER));
    chars.push(pick(&mut rng, DIGITS));
    chars.push(pick(&mut rng, SYMBOLS));

    let pool: Vec<u8> = [LOWER, UPPER, DIGITS, SYMBOLS].concat();
    while chars.len() < PASSWORD_LEN {
        chars.push(pick(&mut rng, &pool));
    }

    // Shuffle so the class-guaranteed characters are not positionally fixed
    chars.shuffle(&mut rng);
    chars.into_iter().collect()
}

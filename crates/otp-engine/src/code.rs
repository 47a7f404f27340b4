use rand::Rng;

/// Smallest code issued.
pub const CODE_MIN: u32 = 100_000;
/// Largest code issued.
pub const CODE_MAX: u32 = 999_999;

/// Uniformly random six-digit code from the thread-local CSPRNG.
pub fn generate_code() -> String {
    generate_code_with(&mut rand::thread_rng())
}

pub fn generate_code_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.gen_range(CODE_MIN..=CODE_MAX).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_codes_are_six_digits_in_range() {
        for _ in 0..10_000 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            let value: u32 = code.parse().unwrap();
            assert!((CODE_MIN..=CODE_MAX).contains(&value));
        }
    }

    #[test]
    fn test_seeded_generation_is_repeatable() {
        let a = generate_code_with(&mut StdRng::seed_from_u64(7));
        let b = generate_code_with(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }
}

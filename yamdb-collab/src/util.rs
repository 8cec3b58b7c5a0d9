use rand::{distributions::Alphanumeric, thread_rng, Rng};

const CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

/// A random code that is easy to type, without look-alike characters
pub fn random_code(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .take(length)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_random_code() {
        let code = random_code(6);

        assert_eq!(code.len(), 6);
        assert!(code.bytes().all(|b| CODE_CHARSET.contains(&b)));
        assert_eq!(random_string(32).len(), 32);
    }
}

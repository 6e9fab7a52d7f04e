use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const LABEL_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789-";
const PATH_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_.%~";

/// Generates a specified number of random URLs with 2-6 host labels and 0-7 path segments.
/// Uses a fixed seed for reproducible benchmark results.
pub fn generate_random_urls(count: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| {
            let labels: Vec<String> =
                (0..rng.gen_range(2..=6)).map(|_| random_word(&mut rng, LABEL_CHARS, 2..=12)).collect();
            let segments: Vec<String> =
                (0..rng.gen_range(0..=7)).map(|_| random_word(&mut rng, PATH_CHARS, 1..=16)).collect();
            let query = if rng.gen_bool(0.3) { "?id=1234&x=y" } else { "" };
            format!("http://{}/{}{}", labels.join("."), segments.join("/"), query)
        })
        .collect()
}

fn random_word(rng: &mut StdRng, chars: &[u8], len: std::ops::RangeInclusive<usize>) -> String {
    let length = rng.gen_range(len);
    (0..length).map(|_| chars[rng.gen_range(0..chars.len())] as char).collect()
}

use sha2::{Digest, Sha256};

const PREFIX: &str = "k8s";
const LABEL_LEN: usize = 8;
const HASH_LEN: usize = 10;

/// Generates a resource name of the form `k8s-<ns>-<name>-<hash>`.
///
/// `namespace` and `name` are stripped of everything but ASCII alphanumerics
/// and truncated, so the result is at most 32 characters long. The hash
/// covers every input in `hashed`, keeping names distinct when truncated
/// labels collide.
pub(crate) fn generate(namespace: &str, name: &str, hashed: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for input in hashed {
        hasher.update(input.as_bytes());
        hasher.update([0]);
    }
    let digest = hex::encode(hasher.finalize());

    format!(
        "{PREFIX}-{}-{}-{}",
        label(namespace),
        label(name),
        &digest[..HASH_LEN]
    )
}

fn label(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_alphanumeric)
        .take(LABEL_LEN)
        .collect()
}

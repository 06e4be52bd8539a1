//! Deterministic identifiers for gateway-side resources.
//!
//! The admin API keys services, routes and upstreams by id, so redeploying
//! the same logical resource must produce the same id to overwrite instead
//! of duplicate. Ids are a pure function of (kind, scope key, name) and
//! stable across processes: the hash is an explicit FNV-1a 32 rather than
//! anything runtime-seeded.

/// Hard limit imposed by the admin API on resource ids.
const ID_MAX_LEN: usize = 64;

/// Longest human-readable slug carried in an id.
const SLUG_MAX_LEN: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Service,
    Route,
    Upstream,
}

impl ResourceKind {
    const fn prefix(&self) -> &'static str {
        match self {
            ResourceKind::Service => "cp-svc",
            ResourceKind::Route => "cp-rt",
            ResourceKind::Upstream => "cp-ups",
        }
    }
}

/// Builds a gateway resource id: `{prefix}-{hash8}-{slug}`.
///
/// `scope_key` disambiguates resources with the same display name (service
/// id for services, service id + route name + index for routes, environment
/// id + name for upstreams). The slug is cosmetic; if `name` sanitizes to
/// nothing the id is still unique through the prefix and hash.
pub fn generate(kind: ResourceKind, scope_key: &str, name: &str) -> String {
    let hash = fnv1a_32(scope_key.as_bytes());
    let slug = slugify(name);

    let mut id = if slug.is_empty() {
        format!("{}-{:08x}", kind.prefix(), hash)
    } else {
        format!("{}-{:08x}-{}", kind.prefix(), hash, slug)
    };

    if id.len() > ID_MAX_LEN {
        id.truncate(ID_MAX_LEN);
    }
    id.trim_end_matches('-').to_string()
}

/// FNV-1a, 32-bit. Written out so the id scheme is reproducible in any
/// language; do not swap for a std hasher.
fn fnv1a_32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let mut hash = OFFSET_BASIS;
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Lowercases and maps every non-alphanumeric run to a single hyphen, then
/// trims and truncates.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_hyphen = true; // suppress leading hyphen

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }

    if slug.len() > SLUG_MAX_LEN {
        slug.truncate(SLUG_MAX_LEN);
    }
    slug.trim_end_matches('-').to_string()
}

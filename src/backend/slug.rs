//! Match-id Slugs
//!
//! Short, human-readable two-word identifiers for matches. The generator
//! is injectable so tests can pin the sequence.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Source of candidate match ids. The dispatcher retries until the
/// candidate is unused, so a source may repeat itself.
pub type SlugSource = Box<dyn FnMut() -> String + Send>;

const ADJECTIVES: &[&str] = &[
    "amber", "bold", "brave", "brisk", "calm", "clever", "crimson", "daring",
    "dusty", "eager", "fierce", "gentle", "golden", "hidden", "humble", "ivory",
    "jolly", "keen", "lively", "lunar", "mellow", "noble", "polar", "quiet",
    "rapid", "rustic", "silent", "solar", "sturdy", "swift", "vivid", "witty",
];

const NOUNS: &[&str] = &[
    "badger", "bison", "comet", "condor", "coral", "crane", "falcon", "fjord",
    "gecko", "glacier", "harbor", "heron", "ibis", "jaguar", "lagoon", "lemur",
    "lynx", "maple", "marmot", "meadow", "orchid", "otter", "panther", "pebble",
    "petrel", "prairie", "raven", "reef", "sparrow", "summit", "tundra", "walrus",
];

fn slug_from(rng: &mut StdRng) -> String {
    // Both lists are non-empty, so choose never returns None.
    let adjective = ADJECTIVES.choose(rng).unwrap_or(&ADJECTIVES[0]);
    let noun = NOUNS.choose(rng).unwrap_or(&NOUNS[0]);
    format!("{adjective}-{noun}")
}

/// Entropy-seeded slug source, the production default.
pub fn random_slugs() -> SlugSource {
    let mut rng = StdRng::from_entropy();
    Box::new(move || slug_from(&mut rng))
}

/// Deterministic slug source for tests and reproducible runs.
pub fn seeded_slugs(seed: u64) -> SlugSource {
    let mut rng = StdRng::seed_from_u64(seed);
    Box::new(move || slug_from(&mut rng))
}

//! Output file names for exported metadata.

/// Left-hand words of the engine's random name generator.
const GENERATED_LEFT: &[&str] = &[
    "happy", "jolly", "dreamy", "sad", "angry", "pensive", "focused", "sleepy", "grave",
    "distracted", "determined", "stoic", "stupefied", "sharp", "agitated", "cocky", "tender",
    "goofy", "furious", "desperate", "hopeful", "compassionate", "silly", "lonely",
    "condescending", "naughty", "kickass", "drunk", "boring", "nostalgic", "ecstatic", "insane",
    "cranky", "mad", "jovial", "sick", "hungry", "thirsty", "elegant", "backstabbing", "clever",
    "trusting", "loving", "suspicious", "berserk", "high", "romantic", "prickly", "evil",
    "admiring", "adoring", "reverent", "serene", "fervent", "modest", "gloomy", "elated",
];

/// Right-hand words of the engine's random name generator.
const GENERATED_RIGHT: &[&str] = &[
    "albattani", "almeida", "archimedes", "ardinghelli", "babbage", "bardeen", "bartik", "bell",
    "blackwell", "bohr", "brattain", "brown", "carson", "colden", "cori", "curie", "darwin",
    "davinci", "einstein", "elion", "engelbart", "euclid", "fermat", "fermi", "feynman",
    "franklin", "galileo", "goldstine", "goodall", "hawking", "heisenberg", "hodgkin", "hoover",
    "hopper", "hypatia", "jang", "jones", "kirch", "kowalevski", "lalande", "leakey", "lovelace",
    "lumiere", "mayer", "mccarthy", "mcclintock", "mclean", "meitner", "mestorf", "morse",
    "newton", "nobel", "pare", "pasteur", "perlman", "pike", "poincare", "ptolemy", "ritchie",
    "rosalind", "sammet", "shockley", "sinoussi", "stallman", "tesla", "thompson", "torvalds",
    "turing", "wilson", "wozniak", "wright", "yalow", "yonath",
];

/// Returns whether `name` looks like an engine-generated `adjective_surname`.
#[must_use]
pub fn looks_generated(name: &str) -> bool {
    name.split_once('_').is_some_and(|(left, right)| {
        GENERATED_LEFT.contains(&left) || GENERATED_RIGHT.contains(&right)
    })
}

/// Picks the metadata file name for a container.
///
/// An explicit `outfile` wins. Otherwise the container name is used unless it
/// looks generated, in which case the short container id is.
#[must_use]
pub fn output_name(outfile: Option<&str>, container_name: &str, short_id: &str) -> String {
    if let Some(explicit) = outfile {
        return explicit.to_string();
    }
    let name = container_name.strip_prefix('/').unwrap_or(container_name);
    if name.is_empty() || looks_generated(name) {
        format!("{short_id}.json")
    } else {
        format!("{name}.json")
    }
}

/// File names for the three artifacts exported for one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    /// Snapshot file, `<base>.json`.
    pub snapshot: String,
    /// Pod manifest, `<base>-pod.json` or `<base>-pod.yaml`.
    pub pod: String,
    /// Service unit, `<base>.service`.
    pub unit: String,
}

impl ArtifactNames {
    /// Derives sibling names from a snapshot file name.
    #[must_use]
    pub fn from_snapshot(snapshot: &str, pod_extension: &str) -> Self {
        let base = snapshot.strip_suffix(".json").unwrap_or(snapshot);
        Self {
            snapshot: snapshot.to_string(),
            pod: format!("{base}-pod.{pod_extension}"),
            unit: format!("{base}.service"),
        }
    }
}

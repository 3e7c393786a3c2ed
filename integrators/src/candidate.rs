//! Candidate sampling configurations.

use common::math::Float;
use itertools::{iproduct, Itertools};
use std::fmt;
use std::str::FromStr;

/// A full sampling configuration: number of light subpaths, number of
/// bidirectional connections per camera vertex and whether merging is on.
/// Candidates are value keys; one moment buffer is kept per candidate.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Candidate {
    /// Number of light subpaths per iteration.
    pub num_light_paths: u32,

    /// Number of bidirectional connections per camera subpath vertex.
    pub num_connections: u32,

    /// Enables merging (photon mapping).
    pub merge: bool,
}

impl Candidate {
    /// Pure unidirectional path tracing.
    pub const PATH_TRACING: Candidate = Candidate {
        num_light_paths: 0,
        num_connections: 0,
        merge: false,
    };

    /// Create a new `Candidate`.
    ///
    /// * `num_light_paths` - Number of light subpaths.
    /// * `num_connections` - Number of connections per camera vertex.
    /// * `merge`           - Enables merging.
    pub const fn new(num_light_paths: u32, num_connections: u32, merge: bool) -> Self {
        Self {
            num_light_paths,
            num_connections,
            merge,
        }
    }

    /// Returns `true` if no light subpaths are traced.
    #[inline]
    pub fn is_path_tracing(&self) -> bool {
        self.num_light_paths == 0
    }

    /// Returns the merge probability implied by this candidate, 0 or 1.
    #[inline]
    pub fn merge_probability(&self) -> Float {
        if self.merge {
            1.0
        } else {
            0.0
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={:06},c={:02},m={}",
            self.num_light_paths,
            self.num_connections,
            u8::from(self.merge)
        )
    }
}

impl FromStr for Candidate {
    type Err = String;

    /// Parses the `n=<count>,c=<count>,m=<0|1>` form written by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split(',');
        let mut field = |prefix: &str| -> Result<&str, String> {
            parts
                .next()
                .and_then(|p| p.strip_prefix(prefix))
                .ok_or_else(|| format!("Invalid candidate '{s}': expected '{prefix}'"))
        };

        let n = field("n=")?;
        let c = field("c=")?;
        let m = field("m=")?;
        if parts.next().is_some() {
            return Err(format!("Invalid candidate '{s}': trailing fields"));
        }

        let num_light_paths = n
            .parse::<u32>()
            .map_err(|e| format!("Invalid light path count in '{s}': {e}"))?;
        let num_connections = c
            .parse::<u32>()
            .map_err(|e| format!("Invalid connection count in '{s}': {e}"))?;
        let merge = match m {
            "0" => false,
            "1" => true,
            other => return Err(format!("Invalid merge flag '{other}' in '{s}'")),
        };

        Ok(Self::new(num_light_paths, num_connections, merge))
    }
}

/// One dimension of a per-image candidate: either a fixed value chosen for
/// the whole image or deferred to a per-pixel mask.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dimension<T> {
    /// Same value for every pixel.
    Fixed(T),

    /// Controlled by a per-pixel mask.
    PerPixel,
}

impl<T: Copy> Dimension<T> {
    /// Returns the fixed value or `None` if the dimension is per-pixel.
    pub fn fixed(&self) -> Option<T> {
        match self {
            Self::Fixed(v) => Some(*v),
            Self::PerPixel => None,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Dimension<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(v) => write!(f, "{v}"),
            Self::PerPixel => write!(f, "*"),
        }
    }
}

/// A per-image candidate where dimensions handled by per-pixel masks are
/// collapsed to `Dimension::PerPixel`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GlobalCandidate {
    /// Number of light subpaths per iteration.
    pub num_light_paths: u32,

    /// Number of connections per camera vertex.
    pub num_connections: Dimension<u32>,

    /// Merge on/off.
    pub merge: Dimension<bool>,
}

impl GlobalCandidate {
    /// Pure path tracing. Light tracing, connections and merges are all off
    /// regardless of the per-pixel masks.
    pub const PATH_TRACING: GlobalCandidate = GlobalCandidate {
        num_light_paths: 0,
        num_connections: Dimension::Fixed(0),
        merge: Dimension::Fixed(false),
    };

    /// Returns the per-image bucket a full candidate contributes to.
    ///
    /// * `candidate`         - The full candidate.
    /// * `per_pixel_connect` - Connections are controlled per pixel.
    /// * `per_pixel_merge`   - Merging is controlled per pixel.
    pub fn project(candidate: &Candidate, per_pixel_connect: bool, per_pixel_merge: bool) -> Self {
        if candidate.is_path_tracing() {
            return Self::PATH_TRACING;
        }
        Self {
            num_light_paths: candidate.num_light_paths,
            num_connections: if per_pixel_connect {
                Dimension::PerPixel
            } else {
                Dimension::Fixed(candidate.num_connections)
            },
            merge: if per_pixel_merge {
                Dimension::PerPixel
            } else {
                Dimension::Fixed(candidate.merge)
            },
        }
    }
}

impl fmt::Display for GlobalCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = match self.merge {
            Dimension::Fixed(m) => u8::from(m).to_string(),
            Dimension::PerPixel => "*".to_string(),
        };
        match self.num_connections {
            Dimension::Fixed(c) => write!(f, "n={:06},c={c:02},m={m}", self.num_light_paths),
            Dimension::PerPixel => write!(f, "n={:06},c=*,m={m}", self.num_light_paths),
        }
    }
}

/// The finite, ordered set of candidates evaluated during one optimisation
/// round. Pure path tracing comes first, followed by the cross product of
/// light path counts, connection counts and merge off/on, in that order.
/// The order is used to break ties.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateSet {
    /// All candidates in enumeration order.
    candidates: Vec<Candidate>,

    /// Distinct non-zero light path counts in enumeration order.
    light_path_counts: Vec<u32>,

    /// Distinct connection counts, ascending.
    connection_counts: Vec<u32>,
}

impl CandidateSet {
    /// Builds the candidate set for an image. Light path counts are computed
    /// once from the pixel count; fractions that yield 0 light paths are
    /// dropped so path tracing is the only zero light path entry.
    ///
    /// * `num_pixels`        - Number of pixels in the frame buffer.
    /// * `light_fractions`   - Light path counts as fractions of the pixel count.
    /// * `connection_counts` - Connection count options.
    pub fn new(num_pixels: usize, light_fractions: &[Float], connection_counts: &[u32]) -> Self {
        assert!(!connection_counts.is_empty(), "CandidateSet::new(): no connection counts");

        let light_path_counts: Vec<u32> = light_fractions
            .iter()
            .map(|&f| (num_pixels as f64 * f as f64) as u32)
            .filter(|&n| n > 0)
            .unique()
            .collect();

        let ordered_connections: Vec<u32> = connection_counts.iter().copied().unique().collect();

        let candidates: Vec<Candidate> = std::iter::once(Candidate::PATH_TRACING)
            .chain(
                iproduct!(light_path_counts.iter(), ordered_connections.iter(), [false, true])
                    .map(|(&n, &c, m)| Candidate::new(n, c, m)),
            )
            .collect();

        let mut connection_counts = ordered_connections;
        connection_counts.sort_unstable();

        Self {
            candidates,
            light_path_counts,
            connection_counts,
        }
    }

    /// Returns the candidates in enumeration order.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Returns the distinct non-zero light path counts.
    pub fn light_path_counts(&self) -> &[u32] {
        &self.light_path_counts
    }

    /// Returns the connection counts in ascending order.
    pub fn connection_counts(&self) -> &[u32] {
        &self.connection_counts
    }

    /// Returns the number of candidates.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Returns `true` if the set has no candidates.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Rounds a fractional connection count up to the nearest candidate
    /// count, or the largest one if it exceeds all of them.
    ///
    /// * `count` - The per-pixel connection count.
    pub fn round_up_connections(&self, count: Float) -> u32 {
        round_up_to_candidate(&self.connection_counts, count)
    }
}

/// Returns the first entry of the ascending `counts` that is at least
/// `count`, or the last entry.
///
/// * `counts` - Ascending connection counts.
/// * `count`  - The value to round.
pub fn round_up_to_candidate(counts: &[u32], count: Float) -> u32 {
    counts
        .iter()
        .copied()
        .find(|&c| c as Float >= count)
        .or_else(|| counts.last().copied())
        .unwrap_or(0)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn display_uses_padded_key_format() {
        assert_eq!(Candidate::new(1024, 4, true).to_string(), "n=001024,c=04,m=1");
        assert_eq!(Candidate::PATH_TRACING.to_string(), "n=000000,c=00,m=0");
    }

    #[test]
    fn parse_rejects_malformed_keys() {
        assert!("n=10,c=1".parse::<Candidate>().is_err());
        assert!("n=10,c=1,m=2".parse::<Candidate>().is_err());
        assert!("c=1,n=10,m=0".parse::<Candidate>().is_err());
        assert!("n=10,c=1,m=0,x=1".parse::<Candidate>().is_err());
    }

    #[test]
    fn candidate_set_starts_with_path_tracing_and_has_one_zero_entry() {
        let set = CandidateSet::new(100, &[0.001, 0.5, 1.0], &[0, 2]);
        assert_eq!(set.candidates()[0], Candidate::PATH_TRACING);
        assert_eq!(set.candidates().iter().filter(|c| c.is_path_tracing()).count(), 1);
        assert_eq!(set.light_path_counts(), &[50, 100]);
        assert_eq!(set.len(), 1 + 2 * 2 * 2);
    }

    #[test]
    fn candidate_set_enumerates_merge_off_before_on() {
        let set = CandidateSet::new(10, &[1.0], &[1, 0]);
        assert_eq!(
            set.candidates(),
            &[
                Candidate::PATH_TRACING,
                Candidate::new(10, 1, false),
                Candidate::new(10, 1, true),
                Candidate::new(10, 0, false),
                Candidate::new(10, 0, true),
            ]
        );
        assert_eq!(set.connection_counts(), &[0, 1]);
    }

    #[test]
    fn round_up_picks_next_candidate_or_largest() {
        let set = CandidateSet::new(10, &[1.0], &[0, 1, 2, 4, 8]);
        assert_eq!(set.round_up_connections(0.0), 0);
        assert_eq!(set.round_up_connections(0.2), 1);
        assert_eq!(set.round_up_connections(2.0), 2);
        assert_eq!(set.round_up_connections(4.5), 8);
        assert_eq!(set.round_up_connections(12.0), 8);
    }

    #[test]
    fn project_collapses_per_pixel_dimensions() {
        let c = Candidate::new(50, 4, true);
        let g = GlobalCandidate::project(&c, true, false);
        assert_eq!(g.num_connections, Dimension::PerPixel);
        assert_eq!(g.merge, Dimension::Fixed(true));
        assert_eq!(g.to_string(), "n=000050,c=*,m=1");
        assert_eq!(
            GlobalCandidate::project(&Candidate::PATH_TRACING, true, true),
            GlobalCandidate::PATH_TRACING
        );
    }

    proptest! {
        #[test]
        fn display_then_parse_gives_same_candidate(n in 0..999_999u32, c in 0..99u32, m in any::<bool>()) {
            let candidate = Candidate::new(n, c, m);
            prop_assert_eq!(candidate.to_string().parse::<Candidate>(), Ok(candidate));
        }
    }
}

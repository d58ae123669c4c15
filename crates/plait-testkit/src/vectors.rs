//! Link derivation vectors.
//!
//! Readers locate messages purely by recomputing links, so every
//! implementation must derive the same addresses from the same inputs.
//! Each vector fixes the inputs and the addresses they must produce;
//! [`derive_links`] computes the addresses.

use serde::Serialize;

use plait_core::{Identity, LinkGenerator};

/// A link derivation test vector.
#[derive(Debug, Clone)]
pub struct LinkVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Seed of the channel author.
    pub author_seed: &'static [u8],
    /// Channel index of the announcement.
    pub channel_index: u64,
    /// Seed of the publisher whose links are derived.
    pub publisher_seed: &'static [u8],
    /// Sequence number of the derived message links.
    pub seq: u64,
    /// Expected links, in the `channel:msg` hex form of `Link::to_hex`.
    pub expected_announce: &'static str,
    pub expected_next: &'static str,
    pub expected_chain: &'static str,
    pub expected_branch: &'static str,
}

/// Links derived from one vector, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedLinks {
    pub name: String,
    pub announce: String,
    /// Single-depth address and multi-branch Sequence address.
    pub next: String,
    /// Single-branch successor of the announcement.
    pub chain: String,
    /// Multi-branch content address linked to the announcement.
    pub branch: String,
}

pub fn all_vectors() -> Vec<LinkVector> {
    vec![
        LinkVector {
            name: "author publishes first message",
            author_seed: b"vector author",
            channel_index: 0,
            publisher_seed: b"vector author",
            seq: 1,
            expected_announce:
                "324ec1c969d9e5241a67a5178249ddb849cea56c1f03aa786da5a50c4b4ab16f:73491c076cc4e51cd52f2268f82cf859bf85bdebac516d8b0bb0404f9cfbf048",
            expected_next:
                "324ec1c969d9e5241a67a5178249ddb849cea56c1f03aa786da5a50c4b4ab16f:189ce36014e7cdc5aad13ed7e798bf32f9ea31e813f80a69463e7e6a38291b99",
            expected_chain:
                "324ec1c969d9e5241a67a5178249ddb849cea56c1f03aa786da5a50c4b4ab16f:7b21d1f9ae08f7ba5010441b321345ceadeae0fe07ec5dcd591476a510bb6e8d",
            expected_branch:
                "324ec1c969d9e5241a67a5178249ddb849cea56c1f03aa786da5a50c4b4ab16f:dc96cc05b1ffeffab7853b09d8b4fc5dd1f11febd74cb1f77116fab56f901b6f",
        },
        LinkVector {
            name: "subscriber registration slot",
            author_seed: b"vector author",
            channel_index: 0,
            publisher_seed: b"vector subscriber",
            seq: 0,
            expected_announce:
                "324ec1c969d9e5241a67a5178249ddb849cea56c1f03aa786da5a50c4b4ab16f:73491c076cc4e51cd52f2268f82cf859bf85bdebac516d8b0bb0404f9cfbf048",
            expected_next:
                "324ec1c969d9e5241a67a5178249ddb849cea56c1f03aa786da5a50c4b4ab16f:a1ab4ee3b69a3db0649f80f51c3e57672580a46a7be63f7ad17cee90c8d033b4",
            expected_chain:
                "324ec1c969d9e5241a67a5178249ddb849cea56c1f03aa786da5a50c4b4ab16f:38f6e758af78a514a108d63d746bd4f65fdd792352b6446070abc00048a64df1",
            expected_branch:
                "324ec1c969d9e5241a67a5178249ddb849cea56c1f03aa786da5a50c4b4ab16f:a283e8dd09538105cce4bad54bdde4e0ac96132acee1b2ffe29aca5e75540e05",
        },
        LinkVector {
            name: "second channel of the same author",
            author_seed: b"vector author",
            channel_index: 1,
            publisher_seed: b"vector subscriber",
            seq: 7,
            expected_announce:
                "caac0666d90589d119eb11d8afd16bd075fb58cdf3eba32bfac77a7f69bc1995:712b7b4a3b3d757809ff2d3380859bb2c28d64030947c52aa673c01d58647a3f",
            expected_next:
                "caac0666d90589d119eb11d8afd16bd075fb58cdf3eba32bfac77a7f69bc1995:deff71ed384cfdf471adba715f013062196b805185bdb09e461a31db88a47062",
            expected_chain:
                "caac0666d90589d119eb11d8afd16bd075fb58cdf3eba32bfac77a7f69bc1995:104019894c7ebe367d24f0d21dc204290b4fa36eb146e6808796ecd0a5c15fb2",
            expected_branch:
                "caac0666d90589d119eb11d8afd16bd075fb58cdf3eba32bfac77a7f69bc1995:eb34fffd5a88d2d408e593652aae821bf3fcb1142dfcc0e78b981b57a795f884",
        },
        LinkVector {
            name: "large sequence number",
            author_seed: &[0x42; 32],
            channel_index: u64::MAX,
            publisher_seed: &[0x00; 32],
            seq: u64::MAX - 1,
            expected_announce:
                "5433a0e92db0f447c7085e1f973c006a2aeac3234c3130bd3c9beeb3d54342d1:a7392fdc05596f2eb3dccc2f1fafa824efd87d286bdf99eab2fc9cb8f2a4b4fd",
            expected_next:
                "5433a0e92db0f447c7085e1f973c006a2aeac3234c3130bd3c9beeb3d54342d1:e8b8ec893f8dbf8f80df27b2176b7b25d329c123b98d93e775c1f750c45b39c1",
            expected_chain:
                "5433a0e92db0f447c7085e1f973c006a2aeac3234c3130bd3c9beeb3d54342d1:4e58e829c050c54230458ae6288cdcfbe8a6e8e28c8ac40d67622c0a5e2d51b6",
            expected_branch:
                "5433a0e92db0f447c7085e1f973c006a2aeac3234c3130bd3c9beeb3d54342d1:ca24332e23d24930d7c44c6411ee08e083b0bfcf6d5366ff951e274e6dc26fa4",
        },
    ]
}

/// Derive every link kind for a vector.
pub fn derive_links(vector: &LinkVector) -> anyhow::Result<DerivedLinks> {
    let author = Identity::generate(vector.author_seed)?;
    let publisher = Identity::generate(vector.publisher_seed)?.identifier();

    let mut links = LinkGenerator::new();
    let announce = links.channel_root(&author.public_key(), vector.channel_index);
    Ok(DerivedLinks {
        name: vector.name.to_string(),
        announce: announce.to_hex(),
        next: links.next_link(&publisher, vector.seq)?.to_hex(),
        chain: links.chain_link(&announce, vector.seq)?.to_hex(),
        branch: links.branch_link(&announce, &publisher, vector.seq)?.to_hex(),
    })
}

impl LinkVector {
    /// The pinned links, shaped like [`derive_links`] output.
    pub fn expected(&self) -> DerivedLinks {
        DerivedLinks {
            name: self.name.to_string(),
            announce: self.expected_announce.to_string(),
            next: self.expected_next.to_string(),
            chain: self.expected_chain.to_string(),
            branch: self.expected_branch.to_string(),
        }
    }
}

/// Derive every vector and report whether it reproduces its pinned links.
pub fn verify_all_vectors() -> anyhow::Result<Vec<(String, bool, DerivedLinks)>> {
    all_vectors()
        .iter()
        .map(|v| {
            let derived = derive_links(v)?;
            Ok((v.name.to_string(), derived == v.expected(), derived))
        })
        .collect()
}

/// All derived vectors as pretty JSON, for pinning and cross-checking.
pub fn vectors_json() -> anyhow::Result<String> {
    let derived = all_vectors()
        .iter()
        .map(derive_links)
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(serde_json::to_string_pretty(&derived)?)
}

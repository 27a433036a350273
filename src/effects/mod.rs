//! Audio effect graph
//!
//! Three processing topologies between the stream source and the output:
//! - Original: source straight to output
//! - Headphone: low-shelf + high-shelf boost
//! - Speaker: a stronger shelf pair plus a parallel convolution reverb mixed back in
//!
//! The graph is a description; a [`crate::ports::MediaOutput`] renders it.

pub mod impulse;

use serde::{Deserialize, Serialize};

pub use impulse::ImpulseResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    #[default]
    Original,
    Headphone,
    Speaker,
}

impl Topology {
    pub fn label(self) -> &'static str {
        match self {
            Topology::Original => "Original",
            Topology::Headphone => "Headphone",
            Topology::Speaker => "Speaker",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "original" | "off" | "none" => Some(Topology::Original),
            "headphone" | "headphones" => Some(Topology::Headphone),
            "speaker" | "speakers" => Some(Topology::Speaker),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    Source,
    LowShelf { frequency_hz: f32, gain_db: f32 },
    HighShelf { frequency_hz: f32, gain_db: f32 },
    Convolver { decay_secs: f32 },
    Gain { level: f32 },
    Output,
}

const SOURCE: usize = 0;
const OUTPUT: usize = 1;

const LOW_SHELF_HZ: f32 = 200.0;
const HIGH_SHELF_HZ: f32 = 3000.0;
const REVERB_DECAY_SECS: f32 = 1.5;
const REVERB_MIX: f32 = 0.4;

/// Nodes and the directed connections between them for the active topology.
#[derive(Debug, Clone)]
pub struct EffectGraph {
    topology: Topology,
    nodes: Vec<Node>,
    edges: Vec<(usize, usize)>,
}

impl Default for EffectGraph {
    fn default() -> Self {
        let mut graph = Self {
            topology: Topology::Original,
            nodes: Vec::new(),
            edges: Vec::new(),
        };
        graph.connect(Topology::Original);
        graph
    }
}

impl EffectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Tear down every node of the previous topology, then wire `topology`.
    pub fn connect(&mut self, topology: Topology) {
        self.disconnect();
        self.topology = topology;

        match topology {
            Topology::Original => self.link(SOURCE, OUTPUT),
            Topology::Headphone => {
                let low = self.add(Node::LowShelf {
                    frequency_hz: LOW_SHELF_HZ,
                    gain_db: 4.0,
                });
                let high = self.add(Node::HighShelf {
                    frequency_hz: HIGH_SHELF_HZ,
                    gain_db: 3.0,
                });
                self.link(SOURCE, low);
                self.link(low, high);
                self.link(high, OUTPUT);
            }
            Topology::Speaker => {
                let low = self.add(Node::LowShelf {
                    frequency_hz: LOW_SHELF_HZ,
                    gain_db: 6.0,
                });
                let high = self.add(Node::HighShelf {
                    frequency_hz: HIGH_SHELF_HZ,
                    gain_db: 5.0,
                });
                let reverb = self.add(Node::Convolver {
                    decay_secs: REVERB_DECAY_SECS,
                });
                let wet = self.add(Node::Gain { level: REVERB_MIX });
                self.link(SOURCE, low);
                self.link(low, high);
                // dry
                self.link(high, OUTPUT);
                // wet
                self.link(high, reverb);
                self.link(reverb, wet);
                self.link(wet, OUTPUT);
            }
        }
    }

    fn disconnect(&mut self) {
        self.edges.clear();
        self.nodes.clear();
        self.nodes.push(Node::Source);
        self.nodes.push(Node::Output);
    }

    fn add(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn link(&mut self, from: usize, to: usize) {
        self.edges.push((from, to));
    }

    /// Connections leaving the source. More than one would mean a duplicated signal path.
    pub fn source_fanout(&self) -> usize {
        self.edges.iter().filter(|(from, _)| *from == SOURCE).count()
    }

    /// Filter nodes in signal order on the dry path, source and output excluded.
    pub fn shelves(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::LowShelf { .. } | Node::HighShelf { .. }))
    }

    /// Decay and mix level of the reverb branch, if the topology has one.
    pub fn reverb(&self) -> Option<(f32, f32)> {
        let decay = self.nodes.iter().find_map(|n| match n {
            Node::Convolver { decay_secs } => Some(*decay_secs),
            _ => None,
        })?;
        let mix = self
            .nodes
            .iter()
            .find_map(|n| match n {
                Node::Gain { level } => Some(*level),
                _ => None,
            })
            .unwrap_or(1.0);
        Some((decay, mix))
    }

    /// Every node reachable from the source reaches the output.
    pub fn is_complete(&self) -> bool {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![SOURCE];
        while let Some(n) = stack.pop() {
            if std::mem::replace(&mut seen[n], true) {
                continue;
            }
            let outgoing: Vec<usize> = self
                .edges
                .iter()
                .filter(|(from, _)| *from == n)
                .map(|(_, to)| *to)
                .collect();
            if outgoing.is_empty() && n != OUTPUT {
                return false;
            }
            stack.extend(outgoing);
        }
        seen[OUTPUT]
    }
}

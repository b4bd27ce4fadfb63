#![allow(dead_code)]

use hierarchy::{ChainClient, ClientPool, Coordinate, Hash, Header, Level, MemoryChain};

/// Deterministic fixture hash
pub fn fixture_hash(label: &str) -> Hash {
    Hash(blake3::hash(label.as_bytes()).into())
}

/// Builds a consistent hierarchy of in-memory chains.
///
/// Every block lands in its zone chain; region- and top-order blocks are also
/// coincident blocks of their region (and top) chain. Genesis is shared by all.
pub struct Sim {
    pub genesis: Hash,
    pub top: MemoryChain,
    pub regions: Vec<MemoryChain>,
    pub zones: Vec<Vec<MemoryChain>>,
    top_tip: Header,
    region_tips: Vec<Header>,
    zone_tips: Vec<Vec<Header>>,
    mined: u64,
}

impl Sim {
    pub fn new(r: usize) -> Self {
        let genesis = Header {
            hash: fixture_hash("genesis"),
            parent_hashes: [Hash::ZERO; 3],
            numbers: [0; 3],
            location: Coordinate::default(),
        };

        let mut top = MemoryChain::new("top", Level::Top);
        top.insert(genesis.clone());
        let regions = (0..r)
            .map(|i| {
                let mut c = MemoryChain::new(format!("region-{i}"), Level::Region);
                c.insert(genesis.clone());
                c
            })
            .collect();
        let zones = (0..r)
            .map(|i| {
                (0..r)
                    .map(|j| {
                        let mut c = MemoryChain::new(format!("zone-{i}-{j}"), Level::Zone);
                        c.insert(genesis.clone());
                        c
                    })
                    .collect()
            })
            .collect();

        Self {
            genesis: genesis.hash,
            top,
            regions,
            zones,
            top_tip: genesis.clone(),
            region_tips: vec![genesis.clone(); r],
            zone_tips: vec![vec![genesis; r]; r],
            mined: 0,
        }
    }

    /// Mine one block in zone (`region`, `zone`) at the given order
    pub fn mine(&mut self, order: Level, region: usize, zone: usize) -> Hash {
        self.mined += 1;
        let top_tip = &self.top_tip;
        let region_tip = &self.region_tips[region];
        let zone_tip = &self.zone_tips[region][zone];

        let header = Header {
            hash: fixture_hash(&format!("block-{}", self.mined)),
            parent_hashes: [top_tip.hash, region_tip.hash, zone_tip.hash],
            numbers: [
                top_tip.number(Level::Top) + u64::from(order == Level::Top),
                region_tip.number(Level::Region) + u64::from(order != Level::Zone),
                zone_tip.number(Level::Zone) + 1,
            ],
            location: Coordinate::new(region, zone),
        };

        self.zones[region][zone].insert(header.clone());
        self.zone_tips[region][zone] = header.clone();
        if order != Level::Zone {
            self.regions[region].insert(header.clone());
            self.region_tips[region] = header.clone();
        }
        if order == Level::Top {
            self.top.insert(header.clone());
            self.top_tip = header.clone();
        }
        header.hash
    }

    pub fn into_pool(self) -> ClientPool<MemoryChain> {
        ClientPool::from_clients(self.top, self.regions, self.zones, |c| c.endpoint().to_string())
            .expect("square fixture")
    }
}

/// Top-tier header with an explicit parent, for hand-built top chains
pub fn top_header(hash: Hash, parent: Hash, number: u64, region: usize) -> Header {
    Header {
        hash,
        parent_hashes: [parent, Hash::ZERO, Hash::ZERO],
        numbers: [number, 0, 0],
        location: Coordinate::new(region, 0),
    }
}

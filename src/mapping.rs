//src/mapping.rs

use ahash::AHashMap;
use std::io::BufRead;
use std::path::Path;

use crate::error::Result;
use crate::oracles::IdMappingService;
use crate::reader::open_reader;
use crate::types::GeneRecord;

/// In-memory accession -> id table.
#[derive(Debug, Clone, Default)]
pub struct AccessionIdTable {
    ids: AHashMap<Vec<u8>, i32>,
}

impl AccessionIdTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, accession: &[u8], id: i32) {
        self.ids.insert(accession.to_vec(), id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Loads `accession\tid` lines; malformed lines and ids <= 0 are skipped.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = open_reader(path.as_ref())?;
        let mut table = Self::new();
        for line in reader.lines() {
            let line = line?;
            let parts: Vec<_> = line.trim().split('\t').collect();
            if parts.len() != 2 {
                continue;
            }
            let id: i32 = parts[1].parse().unwrap_or(0);
            if id > 0 {
                table.insert(parts[0].as_bytes(), id);
            }
        }
        log::info!("Loaded {} accession mappings from {}", table.len(), path.as_ref().display());
        Ok(table)
    }
}

impl IdMappingService for AccessionIdTable {
    fn id_from_accession(&self, accession: &[u8]) -> Option<i32> {
        self.ids.get(accession).copied()
    }
}

/// The id-mapping services in use for one run. Constructed by the caller and
/// passed by reference to whoever needs it.
#[derive(Default)]
pub struct MappingContext {
    pub kegg: Option<Box<dyn IdMappingService>>,
    pub cog: Option<Box<dyn IdMappingService>>,
    pub seed: Option<Box<dyn IdMappingService>>,
    pub interpro: Option<Box<dyn IdMappingService>>,
}

impl MappingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kegg(mut self, service: impl IdMappingService + 'static) -> Self {
        self.kegg = Some(Box::new(service));
        self
    }

    pub fn with_cog(mut self, service: impl IdMappingService + 'static) -> Self {
        self.cog = Some(Box::new(service));
        self
    }

    pub fn with_seed(mut self, service: impl IdMappingService + 'static) -> Self {
        self.seed = Some(Box::new(service));
        self
    }

    pub fn with_interpro(mut self, service: impl IdMappingService + 'static) -> Self {
        self.interpro = Some(Box::new(service));
        self
    }

    /// Sets every non-zero id the configured services know for `accession`.
    pub fn annotate(&self, accession: &[u8], gene: &mut GeneRecord) {
        let lookup = |service: &Option<Box<dyn IdMappingService>>| {
            service
                .as_ref()
                .and_then(|s| s.id_from_accession(accession))
                .filter(|&id| id != 0)
        };
        if let Some(id) = lookup(&self.kegg) {
            gene.kegg_id = id;
        }
        if let Some(id) = lookup(&self.cog) {
            gene.cog_id = id;
        }
        if let Some(id) = lookup(&self.seed) {
            gene.seed_id = id;
        }
        if let Some(id) = lookup(&self.interpro) {
            gene.interpro_id = id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotate_sets_only_known_ids() {
        let mut kegg = AccessionIdTable::new();
        kegg.insert(b"WP_1.1", 2001);
        let mut cog = AccessionIdTable::new();
        cog.insert(b"WP_1.1", 0);
        cog.insert(b"WP_2.1", 77);

        let ctx = MappingContext::new().with_kegg(kegg).with_cog(cog);

        let mut gene = GeneRecord::default();
        ctx.annotate(b"WP_1.1", &mut gene);
        assert_eq!((gene.kegg_id, gene.cog_id, gene.seed_id, gene.interpro_id), (2001, 0, 0, 0));

        let mut gene = GeneRecord::default();
        ctx.annotate(b"WP_2.1", &mut gene);
        assert_eq!((gene.kegg_id, gene.cog_id), (0, 77));
    }

    #[test]
    fn load_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kegg.tsv");
        std::fs::write(&path, "WP_1.1\t5\nbroken line\nWP_2.1\tx\nWP_3.1\t9\n").unwrap();
        let table = AccessionIdTable::load(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.id_from_accession(b"WP_3.1"), Some(9));
        assert_eq!(table.id_from_accession(b"WP_2.1"), None);
    }
}

use std::collections::HashMap;

/// Hands out document-unique ids (`dmd_1`, `amd_1`, `file_1`, ...).
///
/// Counters are per prefix, so the same object always yields the same ids.
#[derive(Debug, Default)]
pub struct IdAllocator {
    counters: HashMap<&'static str, u32>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, prefix: &'static str) -> String {
        let n = self.counters.entry(prefix).or_insert(0);
        *n += 1;
        format!("{}_{}", prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_per_prefix() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.next("dmd"), "dmd_1");
        assert_eq!(ids.next("dmd"), "dmd_2");
        assert_eq!(ids.next("file"), "file_1");
    }
}

//! The per-session copy of the device's register map.

use crate::{
    error::{Error, Result},
    register::{RegisterAddress, SUNSPEC_BASE},
};

/// Number of registers covered by the shadow, starting at [`SUNSPEC_BASE`].
///
/// Large enough for the longest Fronius chain: a float inverter with MPPT extension and a
/// storage block, followed by the end marker.
pub const SHADOW_LEN: usize = 352;

/// Last successfully read value of each register in the SunSpec window.
///
/// Registers that were never fetched read back as [`Error::NotFetched`] instead of zero.
/// Windows fetched by separate calls may come from different points in time.
pub struct RegisterShadow {
    base: u16,
    cells: [Option<u16>; SHADOW_LEN],
}

impl Default for RegisterShadow {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterShadow {
    pub const fn new() -> Self {
        Self {
            base: SUNSPEC_BASE,
            cells: [None; SHADOW_LEN],
        }
    }

    fn index(&self, address: u16, count: u16) -> Result<usize> {
        let start = address
            .checked_sub(self.base)
            .ok_or(Error::OutOfWindow { address, count })? as usize;
        if start + count as usize > SHADOW_LEN {
            return Err(Error::OutOfWindow { address, count });
        }
        Ok(start)
    }

    /// Overwrite the window starting at `address` with freshly read values.
    pub fn store(&mut self, address: u16, words: &[u16]) -> Result<()> {
        let start = self.index(address, words.len() as u16)?;
        for (cell, word) in self.cells[start..start + words.len()].iter_mut().zip(words) {
            *cell = Some(*word);
        }
        Ok(())
    }

    pub fn word(&self, address: u16) -> Result<u16> {
        let index = self.index(address, 1)?;
        self.cells[index].ok_or(Error::NotFetched { address })
    }

    /// `K` consecutive registers starting at `address`.
    pub fn words<const K: usize>(&self, address: u16) -> Result<[u16; K]> {
        let start = self.index(address, K as u16)?;
        let mut words = [0u16; K];
        for (offset, word) in words.iter_mut().enumerate() {
            *word = self.cells[start + offset].ok_or(Error::NotFetched {
                address: address + offset as u16,
            })?;
        }
        Ok(words)
    }

    /// Whether every register of `window` has been fetched.
    pub fn is_fetched(&self, window: RegisterAddress) -> bool {
        match self.index(window.address, window.count) {
            Ok(start) => self.cells[start..start + window.count as usize]
                .iter()
                .all(Option::is_some),
            Err(_) => false,
        }
    }

    /// Whether `window` can be held by the shadow at all.
    pub fn covers(&self, window: RegisterAddress) -> bool {
        self.index(window.address, window.count).is_ok()
    }

    /// Forget every fetched value.
    pub fn clear(&mut self) {
        self.cells = [None; SHADOW_LEN];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfetched_registers_are_reported() {
        let shadow = RegisterShadow::new();
        assert!(matches!(
            shadow.word(40071),
            Err(Error::NotFetched { address: 40071 })
        ));
    }

    #[test]
    fn store_and_read_back() {
        let mut shadow = RegisterShadow::new();
        shadow.store(40069, &[111, 60]).unwrap();
        assert_eq!(shadow.word(40069).unwrap(), 111);
        assert_eq!(shadow.words::<2>(40069).unwrap(), [111, 60]);
        assert!(shadow.is_fetched(RegisterAddress::new(40069, 2)));
        assert!(!shadow.is_fetched(RegisterAddress::new(40069, 3)));
    }

    #[test]
    fn partial_windows_name_the_gap() {
        let mut shadow = RegisterShadow::new();
        shadow.store(40100, &[1]).unwrap();
        assert!(matches!(
            shadow.words::<2>(40100),
            Err(Error::NotFetched { address: 40101 })
        ));
    }

    #[test]
    fn out_of_window_addresses() {
        let mut shadow = RegisterShadow::new();
        assert!(matches!(
            shadow.store(39999, &[0]),
            Err(Error::OutOfWindow { .. })
        ));
        let last = SUNSPEC_BASE + SHADOW_LEN as u16 - 1;
        assert!(shadow.store(last, &[7]).is_ok());
        assert!(matches!(
            shadow.store(last, &[7, 8]),
            Err(Error::OutOfWindow { .. })
        ));
        assert!(!shadow.covers(RegisterAddress::new(last, 2)));
    }

    #[test]
    fn clear_forgets_values() {
        let mut shadow = RegisterShadow::new();
        shadow.store(40000, &[0x5375, 0x6E53]).unwrap();
        shadow.clear();
        assert!(!shadow.is_fetched(RegisterAddress::new(40000, 2)));
    }
}

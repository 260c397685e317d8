//! The slot engine: placement, displacement, chaining, lookup, removal,
//! iteration, and clear.
//!
//! Every slot doubles as a hash-directory entry, a value-chain node, and
//! a collision-displacement target, discriminated by the sign of
//! `SlotHeader::count` (see `layout.rs`). `put`/`remove` operate purely
//! through the small set of primitives at the bottom of this file
//! (`copy_slot`, `remove_slot`, `remove_data`, `relocate_slot`,
//! `find_empty_from`) so the higher-level operations read as a sequence
//! of role transitions rather than raw pointer juggling.

use crate::error::{Error, Result};
use crate::hash::{fingerprint, home_index};
use crate::layout::{
    self, ext_offset, pair_offset, Header, SlotHeader, COUNT_COLLIDING, COUNT_EMPTY,
    COUNT_EXTENSION, HEADER_SIZE, LINK_NONE,
};
use log::{debug, trace, warn};

/// An in-place hash table whose entire state lives inside `region`.
///
/// `KEYMAX` and `VALMAX` are compile-time parameters: every slot holds up
/// to `KEYMAX` inline key bytes before fingerprint-assisted comparison
/// kicks in (`KEYMAX` must be at least 16), and up to `VALMAX` inline
/// value bytes before the value spills into a chain of extension slots
/// sized `EXTMAX = KEYMAX + 16 + size_of::<u16>() + VALMAX` bytes each.
///
/// The handle owns no data: dropping it has no effect on `region`, and a
/// fresh handle may be reattached to the same bytes at any time.
pub struct HashArr<'a, const KEYMAX: usize, const VALMAX: usize> {
    region: &'a mut [u8],
}

impl<'a, const KEYMAX: usize, const VALMAX: usize> HashArr<'a, KEYMAX, VALMAX> {
    const ASSERT_KEYMAX_VALID: () = assert!(KEYMAX >= 16, "KEYMAX must be at least 16 bytes");

    /// Byte width of one slot for this instantiation's `(KEYMAX, VALMAX)`.
    const fn slot_size() -> usize {
        layout::slot_size(KEYMAX, VALMAX)
    }

    /// Byte width of a slot's payload region (identical for pair and ext
    /// shapes).
    const fn payload_size() -> usize {
        layout::payload_size(KEYMAX, VALMAX)
    }

    /// Required byte size of a region to hold `capacity` slots.
    pub fn required_size(capacity: u32) -> usize {
        layout::required_size(capacity, KEYMAX, VALMAX)
    }

    /// Create a new table in `region`, zeroing it and deriving capacity
    /// from its length.
    pub fn create(region: &'a mut [u8]) -> Result<Self> {
        let () = Self::ASSERT_KEYMAX_VALID;
        let capacity = layout::capacity_for_size(region.len(), KEYMAX, VALMAX);
        if capacity < 1 {
            return Err(Error::InvalidArgument(
                "region too small to hold at least one slot",
            ));
        }
        region.fill(0);
        let mut table = HashArr { region };
        table.set_header(Header {
            capacity,
            used: 0,
            entries: 0,
        });
        debug!(
            "create: capacity={capacity} slot_size={}",
            Self::slot_size()
        );
        Ok(table)
    }

    /// Attach to an existing table already present in `region`, trusting
    /// the header as-is.
    pub fn attach(region: &'a mut [u8]) -> Result<Self> {
        let () = Self::ASSERT_KEYMAX_VALID;
        if region.len() < HEADER_SIZE + Self::slot_size() {
            return Err(Error::InvalidArgument(
                "region too small to hold a header and one slot",
            ));
        }
        let table = HashArr { region };
        trace!("attach: capacity={}", table.header().capacity);
        Ok(table)
    }

    // ---- raw accessors -------------------------------------------------

    fn header(&self) -> Header {
        unsafe { std::ptr::read_unaligned(self.region.as_ptr() as *const Header) }
    }

    fn set_header(&mut self, header: Header) {
        unsafe {
            std::ptr::write_unaligned(self.region.as_mut_ptr() as *mut Header, header);
        }
    }

    fn slot_offset(idx: u32) -> usize {
        HEADER_SIZE + idx as usize * Self::slot_size()
    }

    fn slot_header(&self, idx: u32) -> SlotHeader {
        let off = Self::slot_offset(idx);
        unsafe { std::ptr::read_unaligned(self.region[off..].as_ptr() as *const SlotHeader) }
    }

    fn set_slot_header(&mut self, idx: u32, header: SlotHeader) {
        let off = Self::slot_offset(idx);
        unsafe {
            std::ptr::write_unaligned(self.region[off..].as_mut_ptr() as *mut SlotHeader, header);
        }
    }

    fn payload(&self, idx: u32) -> &[u8] {
        let start = Self::slot_offset(idx) + layout::SLOT_HEADER_SIZE;
        &self.region[start..start + Self::payload_size()]
    }

    fn payload_mut(&mut self, idx: u32) -> &mut [u8] {
        let start = Self::slot_offset(idx) + layout::SLOT_HEADER_SIZE;
        &mut self.region[start..start + Self::payload_size()]
    }

    fn read_keylen(&self, idx: u32) -> u16 {
        let payload = self.payload(idx);
        let o = pair_offset::keylen(KEYMAX);
        u16::from_ne_bytes([payload[o], payload[o + 1]])
    }

    fn read_key_prefix(&self, idx: u32) -> &[u8] {
        let payload = self.payload(idx);
        &payload[pair_offset::key()..pair_offset::key() + KEYMAX]
    }

    fn read_fingerprint(&self, idx: u32) -> [u8; 16] {
        let payload = self.payload(idx);
        let o = pair_offset::fingerprint(KEYMAX);
        payload[o..o + 16].try_into().unwrap()
    }

    fn read_value_fragment(&self, idx: u32) -> &[u8] {
        let sh = self.slot_header(idx);
        let payload = self.payload(idx);
        let start = if sh.count == COUNT_EXTENSION {
            ext_offset::raw()
        } else {
            pair_offset::value(KEYMAX)
        };
        &payload[start..start + sh.size as usize]
    }

    // ---- slot role primitives ------------------------------------------

    /// `copy_slot(dst, src)`: require `slot[dst]` empty and `slot[src]`
    /// non-empty; bytewise-copy the slot; increment `used`. Must be
    /// followed by a matching `remove_slot` on the source.
    fn copy_slot(&mut self, dst: u32, src: u32) -> Result<()> {
        let dst_header = self.slot_header(dst);
        let src_header = self.slot_header(src);
        if dst_header.count != COUNT_EMPTY || src_header.count == COUNT_EMPTY {
            return Err(Error::Internal("copy_slot: precondition violated"));
        }

        let sz = Self::slot_size();
        let src_off = Self::slot_offset(src);
        let dst_off = Self::slot_offset(dst);
        if src_off < dst_off {
            let (left, right) = self.region.split_at_mut(dst_off);
            right[..sz].copy_from_slice(&left[src_off..src_off + sz]);
        } else {
            let (left, right) = self.region.split_at_mut(src_off);
            left[dst_off..dst_off + sz].copy_from_slice(&right[..sz]);
        }

        let mut header = self.header();
        header.used += 1;
        self.set_header(header);
        Ok(())
    }

    /// `remove_slot(i)`: require `slot[i]` non-empty; set `count = 0`;
    /// decrement `used`. Does not walk the link chain.
    fn remove_slot(&mut self, idx: u32) -> Result<()> {
        let mut sh = self.slot_header(idx);
        if sh.count == COUNT_EMPTY {
            return Err(Error::Internal("remove_slot: slot already empty"));
        }
        sh.count = COUNT_EMPTY;
        self.set_slot_header(idx, sh);

        let mut header = self.header();
        header.used -= 1;
        self.set_header(header);
        Ok(())
    }

    /// Releases slot `start` and every extension reached via `link`,
    /// clearing each. Never touches `entries`.
    fn remove_data(&mut self, start: u32) -> Result<()> {
        let mut idx = start;
        loop {
            let sh = self.slot_header(idx);
            if sh.count == COUNT_EMPTY {
                return Err(Error::Internal("remove_data: slot already empty"));
            }
            let link = sh.link;
            self.remove_slot(idx)?;
            if link == LINK_NONE {
                break;
            }
            idx = link as u32;
        }
        Ok(())
    }

    /// Relocate a displaced resident of `src` (a colliding or extension
    /// slot belonging to some *other* entry) into `dst`, repairing the
    /// extension back-link if needed. `src` becomes empty.
    fn relocate_slot(&mut self, src: u32, dst: u32) -> Result<()> {
        let sh = self.slot_header(src);
        if sh.count == COUNT_EMPTY {
            return Err(Error::Internal("relocate_slot: source slot empty"));
        }

        self.copy_slot(dst, src)?;
        self.remove_slot(src)?;

        if sh.count == COUNT_EXTENSION {
            let mut prev = self.slot_header(sh.hash);
            prev.link = dst as i32;
            self.set_slot_header(sh.hash, prev);

            if sh.link != LINK_NONE {
                let mut next = self.slot_header(sh.link as u32);
                next.hash = dst;
                self.set_slot_header(sh.link as u32, next);
            }
        }
        Ok(())
    }

    // ---- linear probing primitive --------------------------------------

    /// Scan `s, s+1, ..., capacity-1, 0, ..., s-1` for the first empty
    /// slot. Returns `None` if the table is full.
    fn find_empty_from(&self, start: u32) -> Option<u32> {
        let capacity = self.header().capacity;
        if capacity == 0 {
            return None;
        }
        let start = start % capacity;
        let mut idx = start;
        loop {
            if self.slot_header(idx).count == COUNT_EMPTY {
                return Some(idx);
            }
            idx = (idx + 1) % capacity;
            if idx == start {
                return None;
            }
        }
    }

    // ---- key matching & lookup -----------------------------------------

    fn key_matches(&self, idx: u32, key: &[u8]) -> bool {
        let stored_len = self.read_keylen(idx) as usize;
        if stored_len != key.len() {
            return false;
        }
        if key.len() <= KEYMAX {
            &self.read_key_prefix(idx)[..key.len()] == key
        } else {
            if self.read_key_prefix(idx) != &key[..KEYMAX] {
                return false;
            }
            self.read_fingerprint(idx) == fingerprint(key)
        }
    }

    /// Find the slot index holding `key`, or `None` if absent.
    fn find_index(&self, key: &[u8]) -> Result<Option<u32>> {
        if key.is_empty() {
            return Err(Error::InvalidArgument("key must not be empty"));
        }
        if key.len() > u16::MAX as usize {
            return Err(Error::InvalidArgument("key exceeds 65535 bytes"));
        }
        let header = self.header();
        if header.capacity == 0 {
            return Err(Error::InvalidArgument("table has zero capacity"));
        }

        let home = home_index(key, header.capacity);
        let target = self.slot_header(home).count;
        if target <= 0 {
            return Ok(None);
        }

        let mut seen: i16 = 0;
        let mut idx = home;
        loop {
            let sh = self.slot_header(idx);
            if sh.hash == home && (sh.count >= 1 || sh.count == COUNT_COLLIDING) {
                seen += 1;
                if self.key_matches(idx, key) {
                    return Ok(Some(idx));
                }
                if seen >= target {
                    break;
                }
            }
            idx = (idx + 1) % header.capacity;
            if idx == home {
                break;
            }
        }
        Ok(None)
    }

    fn assemble_value(&self, start: u32) -> Vec<u8> {
        let mut out = Vec::new();
        let mut idx = start;
        loop {
            out.extend_from_slice(self.read_value_fragment(idx));
            let link = self.slot_header(idx).link;
            if link == LINK_NONE {
                break;
            }
            idx = link as u32;
        }
        out
    }

    /// Look up a key and return an owned copy of its value.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.find_index(key)? {
            Some(idx) => {
                trace!("get: hit at slot {idx}");
                Ok(self.assemble_value(idx))
            }
            None => {
                trace!("get: miss");
                Err(Error::NotFound)
            }
        }
    }

    // ---- insertion -------------------------------------------------------

    fn write_key_slot(&mut self, idx: u32, home: u32, count: i16, key: &[u8]) {
        self.set_slot_header(
            idx,
            SlotHeader {
                count,
                _pad: [0, 0],
                hash: home,
                link: LINK_NONE,
                size: 0,
            },
        );

        let fp = fingerprint(key);
        let keylen = key.len() as u16;
        let payload = self.payload_mut(idx);

        let klen = key.len().min(KEYMAX);
        let key_off = pair_offset::key();
        payload[key_off..key_off + klen].copy_from_slice(&key[..klen]);
        for b in &mut payload[key_off + klen..key_off + KEYMAX] {
            *b = 0;
        }

        let fp_off = pair_offset::fingerprint(KEYMAX);
        payload[fp_off..fp_off + 16].copy_from_slice(&fp);

        let len_off = pair_offset::keylen(KEYMAX);
        payload[len_off..len_off + 2].copy_from_slice(&keylen.to_ne_bytes());
    }

    /// Write `value` starting at the already key-tagged slot `first_idx`,
    /// chaining into extension slots as needed. Rolls back via
    /// `remove_data` and returns `NoSpace` if the chain cannot be
    /// completed.
    fn emit_value(&mut self, first_idx: u32, value: &[u8]) -> Result<()> {
        let mut written = 0usize;
        let mut cur = first_idx;
        let mut first = true;

        loop {
            let cap = if first { VALMAX } else { Self::payload_size() };
            let remaining = value.len() - written;
            let chunk = remaining.min(cap);

            let value_off = if first {
                pair_offset::value(KEYMAX)
            } else {
                ext_offset::raw()
            };
            self.payload_mut(cur)[value_off..value_off + chunk]
                .copy_from_slice(&value[written..written + chunk]);

            let mut sh = self.slot_header(cur);
            sh.size = chunk as u32;
            self.set_slot_header(cur, sh);

            let mut header = self.header();
            header.used += 1;
            if first {
                header.entries += 1;
            }
            self.set_header(header);

            written += chunk;
            if written >= value.len() {
                return Ok(());
            }

            let capacity = self.header().capacity;
            let next = match self.find_empty_from((cur + 1) % capacity) {
                Some(n) => n,
                None => {
                    warn!("emit_value: out of space mid-chain, rolling back");
                    self.remove_data(first_idx)?;
                    let mut h = self.header();
                    h.entries -= 1;
                    self.set_header(h);
                    return Err(Error::NoSpace);
                }
            };

            self.set_slot_header(
                next,
                SlotHeader {
                    count: COUNT_EXTENSION,
                    _pad: [0, 0],
                    hash: cur,
                    link: LINK_NONE,
                    size: 0,
                },
            );
            let mut cur_sh = self.slot_header(cur);
            cur_sh.link = next as i32;
            self.set_slot_header(cur, cur_sh);

            cur = next;
            first = false;
        }
    }

    fn commit_new_entry(
        &mut self,
        idx: u32,
        home: u32,
        role_count: i16,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        self.write_key_slot(idx, home, role_count, key);
        self.emit_value(idx, value)
    }

    /// Insert or replace `key` with `value`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidArgument("key must not be empty"));
        }
        if key.len() > u16::MAX as usize {
            return Err(Error::InvalidArgument("key exceeds 65535 bytes"));
        }

        let header = self.header();
        if header.capacity == 0 {
            return Err(Error::InvalidArgument("table has zero capacity"));
        }
        if header.used >= header.capacity {
            return Err(Error::NoSpace);
        }

        let home = home_index(key, header.capacity);
        let lead = self.slot_header(home);

        match lead.count {
            COUNT_EMPTY => {
                debug!("put(new): home {home} empty");
                self.commit_new_entry(home, home, 1, key, value)
            }
            n if n >= 1 => {
                if let Some(existing) = self.find_index(key)? {
                    debug!("put(replace): removing existing entry at {existing}");
                    self.remove_by_index(existing as i32)?;
                    return self.put(key, value);
                }

                let slot = self
                    .find_empty_from((home + 1) % header.capacity)
                    .ok_or(Error::NoSpace)?;
                self.commit_new_entry(slot, home, COUNT_COLLIDING, key, value)?;

                let mut h = self.slot_header(home);
                h.count += 1;
                self.set_slot_header(home, h);
                debug!("put(col): slot {slot} collides on home {home}, count now {}", h.count);
                Ok(())
            }
            _ => {
                // home is occupied by a colliding or extension slot that
                // belongs to a different home; evict it elsewhere.
                let evict_to = self
                    .find_empty_from((home + 1) % header.capacity)
                    .ok_or(Error::NoSpace)?;
                debug!("put(swap): evicting resident of home {home} to {evict_to}");
                self.relocate_slot(home, evict_to)?;
                self.commit_new_entry(home, home, 1, key, value)
            }
        }
    }

    // ---- removal -----------------------------------------------------------

    /// Remove the entry matching `key`.
    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        let idx = self.find_index(key)?.ok_or(Error::NotFound)?;
        self.remove_by_index(idx as i32)
    }

    /// Remove the entry at slot `index`, dispatching on its role.
    pub fn remove_by_index(&mut self, index: i32) -> Result<()> {
        if index < 0 {
            return Err(Error::InvalidArgument("index must be non-negative"));
        }
        let header = self.header();
        if index as u32 >= header.capacity {
            return Err(Error::InvalidArgument("index out of range"));
        }
        let idx = index as u32;
        let sh = self.slot_header(idx);

        match sh.count {
            1 => {
                self.remove_data(idx)?;
                let mut h = self.header();
                h.entries -= 1;
                self.set_header(h);
                debug!("remove_by_idx: solitary leading slot {idx}");
                Ok(())
            }
            n if n > 1 => {
                let capacity = header.capacity;
                let mut probe = (idx + 1) % capacity;
                let mut sibling = None;
                while probe != idx {
                    let psh = self.slot_header(probe);
                    if psh.count == COUNT_COLLIDING && psh.hash == idx {
                        sibling = Some(probe);
                        break;
                    }
                    probe = (probe + 1) % capacity;
                }
                let sibling = sibling.ok_or(Error::Internal(
                    "remove_by_idx: missing collision sibling",
                ))?;

                self.remove_data(idx)?;
                self.copy_slot(idx, sibling)?;
                self.remove_slot(sibling)?;

                let mut h = self.slot_header(idx);
                h.count = n - 1;
                self.set_slot_header(idx, h);

                if h.link != LINK_NONE {
                    let mut nxt = self.slot_header(h.link as u32);
                    nxt.hash = idx;
                    self.set_slot_header(h.link as u32, nxt);
                }

                let mut hd = self.header();
                hd.entries -= 1;
                self.set_header(hd);
                debug!("remove_by_idx(lead): slot {idx} replaced by sibling {sibling}");
                Ok(())
            }
            COUNT_COLLIDING => {
                let mut lead = self.slot_header(sh.hash);
                if lead.count <= 1 {
                    return Err(Error::Internal(
                        "remove_by_idx: leading collision counter mismatch",
                    ));
                }
                lead.count -= 1;
                self.set_slot_header(sh.hash, lead);

                self.remove_data(idx)?;

                let mut hd = self.header();
                hd.entries -= 1;
                self.set_header(hd);
                debug!("remove_by_idx(dup): colliding slot {idx}");
                Ok(())
            }
            _ => {
                warn!("remove_by_idx: index {idx} is not a live entry");
                Err(Error::NotFound)
            }
        }
    }

    // ---- iteration ---------------------------------------------------------

    fn read_key_view(&self, idx: u32) -> Vec<u8> {
        let stored_len = self.read_keylen(idx) as usize;
        let view_len = stored_len.min(KEYMAX);
        self.read_key_prefix(idx)[..view_len].to_vec()
    }

    /// Advance `cursor`, returning the next live entry's key view, its
    /// assembled value, and the cursor to pass on the next call.
    ///
    /// The returned key is truncated when the original key exceeded
    /// `KEYMAX` and cannot be used to re-look up the entry.
    pub fn get_next(&self, cursor: i32) -> Result<(Vec<u8>, Vec<u8>, i32)> {
        if cursor < 0 {
            return Err(Error::InvalidArgument("cursor must be non-negative"));
        }
        let header = self.header();
        let mut idx = cursor as u32;
        while idx < header.capacity {
            let sh = self.slot_header(idx);
            if sh.count != COUNT_EMPTY && sh.count != COUNT_EXTENSION {
                let key_view = self.read_key_view(idx);
                let value = self.assemble_value(idx);
                return Ok((key_view, value, idx as i32 + 1));
            }
            idx += 1;
        }
        Err(Error::NotFound)
    }

    // ---- bulk operations --------------------------------------------------

    /// `(entries, used, capacity)`.
    pub fn size(&self) -> (u32, u32, u32) {
        let h = self.header();
        (h.entries, h.used, h.capacity)
    }

    /// Zero `used` and `entries` and the entire slot array.
    pub fn clear(&mut self) {
        let capacity = self.header().capacity;
        let sz = Self::slot_size();
        for i in 0..capacity as usize {
            let off = HEADER_SIZE + i * sz;
            self.region[off..off + sz].fill(0);
        }
        let mut h = self.header();
        h.used = 0;
        h.entries = 0;
        self.set_header(h);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_of(capacity: u32) -> Vec<u8> {
        vec![0u8; HashArr::<16, 8>::required_size(capacity)]
    }

    #[test]
    fn create_rejects_a_region_too_small_for_one_slot() {
        let mut region = vec![0u8; 4];
        assert!(matches!(
            HashArr::<16, 8>::create(&mut region),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn key_longer_than_keymax_uses_fingerprint_to_disambiguate() {
        let mut region = table_of(4);
        let mut table = HashArr::<16, 8>::create(&mut region).unwrap();

        let long_a = b"this key is much longer than keymax aaaa".to_vec();
        let mut long_b = long_a.clone();
        // Differ only after the KEYMAX-byte prefix, so the inline prefix
        // comparison alone cannot tell them apart.
        *long_b.last_mut().unwrap() ^= 0xff;

        table.put(&long_a, b"a").unwrap();
        table.put(&long_b, b"b").unwrap();

        assert_eq!(table.get(&long_a).unwrap(), b"a");
        assert_eq!(table.get(&long_b).unwrap(), b"b");
    }

    #[test]
    fn find_empty_from_wraps_around_the_slot_array() {
        let mut region = table_of(4);
        let mut table = HashArr::<16, 8>::create(&mut region).unwrap();

        // Fill everything but slot 0, then probe starting past the end.
        for i in 1..4u32 {
            table.write_key_slot(i, i, 1, format!("k{i}").as_bytes());
        }
        assert_eq!(table.find_empty_from(2), Some(0));
    }

    #[test]
    fn remove_by_index_rejects_an_out_of_range_index() {
        let mut region = table_of(4);
        let mut table = HashArr::<16, 8>::create(&mut region).unwrap();
        assert!(matches!(
            table.remove_by_index(4),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            table.remove_by_index(-1),
            Err(Error::InvalidArgument(_))
        ));
    }
}

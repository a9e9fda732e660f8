use std::io::{self, Read, Write};

use log::{debug, info};

use crate::{
    Arena, Cell, DictHandle, FunctionTable, Handle, ImageError, MAX_ADDRESS,
    NativeEntry, SymbolTable, Vm, VmCreateInfo,
};

const IMAGE_MAGIC: &[u8; 8] = b"YARSNAP\0";
const IMAGE_VERSION: u32 = 1;

/// longest symbol or native name accepted from a snapshot
const MAX_NAME_LEN: u32 = 64 * 1024;

impl Vm {
    /// Serializes the arena, root, symbols and native names. The stack is
    /// not part of a snapshot.
    pub fn save(&self) -> Result<Vec<u8>, ImageError> {
        let mut bytes = Vec::new();
        self.save_to(&mut bytes)?;
        Ok(bytes)
    }

    pub fn save_to<W: Write>(&self, mut writer: W) -> Result<(), ImageError> {
        let w: &mut dyn Write = &mut writer;
        let heap = self.heap();

        w.write_all(IMAGE_MAGIC)?;
        write_u32(w, IMAGE_VERSION)?;
        write_u64(w, heap.capacity() as u64)?;
        write_u64(w, heap.top() as u64)?;
        for cell in heap.cells() {
            write_u64(w, cell.raw())?;
        }
        write_u32(w, self.root().addr())?;

        let names = self.symbols().names();
        write_len(w, names.len())?;
        for name in &names {
            write_string(w, name)?;
        }

        write_len(w, self.natives.len())?;
        for native in self.natives.iter() {
            write_string(w, &native.name)?;
        }

        writer.flush()?;
        debug!(
            "saved snapshot: {} cells, {} symbols, {} natives",
            heap.top(),
            names.len(),
            self.natives.len()
        );
        Ok(())
    }

    /// Rebuilds a vm from `save` output. Natives are resolved by name
    /// against `functions`, the result is unfrozen with an empty stack.
    pub fn load(
        bytes: &[u8],
        stack_capacity: usize,
        functions: &FunctionTable,
    ) -> Result<Vm, ImageError> {
        Self::load_from(bytes, stack_capacity, functions)
    }

    pub fn load_from<R: Read>(
        reader: R,
        stack_capacity: usize,
        functions: &FunctionTable,
    ) -> Result<Vm, ImageError> {
        let info = VmCreateInfo {
            stack_size: stack_capacity,
            ..VmCreateInfo::default()
        };
        Self::load_with(reader, &info, functions)
    }

    /// Like `load_from`, with the stack and evaluation limits taken from
    /// `info`. The arena capacity always comes from the snapshot.
    pub fn load_with<R: Read>(
        mut reader: R,
        info: &VmCreateInfo,
        functions: &FunctionTable,
    ) -> Result<Vm, ImageError> {
        let r: &mut dyn Read = &mut reader;

        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)?;
        if &magic != IMAGE_MAGIC {
            return Err(ImageError::BadMagic);
        }
        let version = read_u32(r)?;
        if version != IMAGE_VERSION {
            return Err(ImageError::UnsupportedVersion(version));
        }

        let capacity = read_usize(r)?;
        let top = read_usize(r)?;
        if capacity > MAX_ADDRESS as usize + 1 || top > capacity || top == 0 {
            return Err(ImageError::Corrupt("cell count out of range"));
        }
        let mut cells = Vec::with_capacity(top);
        for _ in 0..top {
            cells.push(Cell::from_raw(read_u64(r)?));
        }
        let arena = Arena::from_cells(cells, capacity)
            .ok_or(ImageError::Corrupt("invalid arena"))?;

        let root: DictHandle = Handle::new(read_u32(r)?);
        if arena.dict_len(root).is_err() {
            return Err(ImageError::Corrupt("root is not a dictionary"));
        }

        let symbol_count = read_u32(r)?;
        let mut names = Vec::new();
        for _ in 0..symbol_count {
            names.push(read_string(r)?);
        }
        let symbols = SymbolTable::from_names(&names)
            .ok_or(ImageError::Corrupt("duplicate symbol"))?;

        let native_count = read_u32(r)?;
        let mut natives = Vec::new();
        for _ in 0..native_count {
            let name = read_string(r)?;
            let Some(func) = functions.get(&name) else {
                return Err(ImageError::UnknownNativeFunction(name));
            };
            natives.push(NativeEntry {
                name: name.into(),
                func,
            });
        }

        info!(
            "loaded snapshot: {top}/{capacity} cells, {} symbols, {} natives",
            names.len(),
            natives.len()
        );
        let mut info = info.clone();
        info.arena.capacity = capacity;
        Ok(Vm::from_parts(arena, symbols, natives, root, info))
    }
}

fn corrupt(what: &'static str) -> ImageError {
    ImageError::Corrupt(what)
}

fn write_len(w: &mut dyn Write, len: usize) -> Result<(), ImageError> {
    let len = u32::try_from(len).map_err(|_| corrupt("table too large"))?;
    write_u32(w, len)?;
    Ok(())
}

fn write_string(w: &mut dyn Write, s: &str) -> Result<(), ImageError> {
    write_len(w, s.len())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn read_string(r: &mut dyn Read) -> Result<String, ImageError> {
    let len = read_u32(r)?;
    if len > MAX_NAME_LEN {
        return Err(corrupt("name too long"));
    }
    let mut bytes = vec![0u8; len as usize];
    r.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| corrupt("name is not utf-8"))
}

fn read_usize(r: &mut dyn Read) -> Result<usize, ImageError> {
    usize::try_from(read_u64(r)?).map_err(|_| corrupt("size out of range"))
}

fn write_u32(w: &mut dyn Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32(r: &mut dyn Read) -> io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn write_u64(w: &mut dyn Write, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u64(r: &mut dyn Read) -> io::Result<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

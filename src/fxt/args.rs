//! FXT argument lists.

use tracing::debug;

use crate::args::{Arg, Variadic};
use crate::error::StructuralError;
use crate::stats::{Stat, Stats};
use crate::strings::StringPool;

use super::cursor::RecordReader;
use super::intern::InternTables;
use super::ArgHeader;

mod arg_type {
    pub const NULL: u8 = 0;
    pub const INT32: u8 = 1;
    pub const UINT32: u8 = 2;
    pub const INT64: u8 = 3;
    pub const UINT64: u8 = 4;
    pub const DOUBLE: u8 = 5;
    pub const STRING: u8 = 6;
    pub const POINTER: u8 = 7;
    pub const KOID: u8 = 8;
    pub const BOOL: u8 = 9;
}

/// Read `count` arguments from the record.
///
/// Each argument is read inside its own declared size, so an argument type
/// this decoder does not know is skipped without losing the word boundary.
pub fn parse_args(
    reader: &mut RecordReader<'_>,
    count: usize,
    tables: &InternTables,
    pool: &mut StringPool,
    stats: &mut Stats,
) -> Result<Vec<Arg>, StructuralError> {
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = reader.absolute_position();
        let header = ArgHeader(reader.peek_word().ok_or(StructuralError::InvalidArgument {
            offset,
            declared_words: 0,
        })?);
        let size = header.size_words() as usize;
        if size == 0 || size > reader.remaining_words() {
            return Err(StructuralError::InvalidArgument {
                offset,
                declared_words: size,
            });
        }
        let mut arg_reader = reader.sub_reader(size, "argument")?;
        arg_reader.word()?;

        let name = tables.resolve_string(header.name_ref(), &mut arg_reader, stats)?;
        let value = match header.arg_type() {
            arg_type::NULL => Variadic::Null,
            arg_type::INT32 => Variadic::Int(header.value32() as i32 as i64),
            arg_type::UINT32 => Variadic::UInt(header.value32() as u64),
            arg_type::INT64 => Variadic::Int(arg_reader.word()? as i64),
            arg_type::UINT64 | arg_type::KOID => Variadic::UInt(arg_reader.word()?),
            arg_type::DOUBLE => Variadic::Real(f64::from_bits(arg_reader.word()?)),
            arg_type::STRING => {
                let s = tables.resolve_string(header.string_value_ref(), &mut arg_reader, stats)?;
                Variadic::String(pool.intern(&s))
            }
            arg_type::POINTER => Variadic::Pointer(arg_reader.word()?),
            arg_type::BOOL => Variadic::Bool(header.bool_value()),
            other => {
                debug!("skipping argument '{}' of unknown type {}", name, other);
                stats.increment(Stat::FxtInvalidArg);
                continue;
            }
        };
        args.push(Arg::new(pool.intern(&name), value));
    }
    Ok(args)
}

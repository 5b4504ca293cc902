#![forbid(unsafe_code)]

mod c_header;
mod cache;
mod collect;
mod sniff;
mod symbol;
mod table;

pub use c_header::{c_type_bit_width, collect_header, HeaderSymbols};
pub use cache::{CacheConfig, CachedFileEntry, SymbolCache, CACHE_FORMAT_VERSION};
pub use collect::{
    collect_unit, storage_bits, BitFieldInfo, BitmapInfo, CollectError, CollectedUnit, EnumInfo,
    RegisterInfo, RegisterMemberInfo, ScopeInfo,
};
pub use sniff::detect_cpp;
pub use symbol::{MemberAccess, ParamInfo, SourceLanguage, StructFieldInfo, Symbol, SymbolKind};
pub use table::{SymbolConflict, SymbolTable};

//! The Sable symbol table: classes, methods, type members, source files.
//!
//! Symbols are arena-allocated and addressed by integer ids (`ClassRef`,
//! `MethodRef`, ...) so that types stay cheap to clone and structurally
//! comparable. The table is read-only during dispatch; all definition
//! happens up front, either in `GlobalEnv::with_builtins` or through the
//! `define_*` methods while the embedder loads a program.

use rowan::TextRange;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ty::Ty;

// ── Ids ────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassRef(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeMemberRef(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeParamId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileId(pub u32);

/// Index into the dispatch core's intrinsic handler table. The table
/// itself lives with the dispatcher; the symbol table only records which
/// entry a method resolved to during registration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct IntrinsicId(pub u16);

/// A source location: a file plus a byte range within it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Loc {
    pub file: FileId,
    pub range: TextRange,
}

impl Loc {
    pub fn new(file: FileId, range: TextRange) -> Loc {
        Loc { file, range }
    }
}

/// Strictness level of a source file. Some diagnostics only fire at
/// `Strict` and above.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum StrictLevel {
    Ignore,
    False,
    True,
    Strict,
}

// ── Parameters ─────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ParamFlags {
    pub keyword: bool,
    pub default: bool,
    pub repeated: bool,
    pub block: bool,
    /// A block parameter the method never mentioned; synthesized so that
    /// every method's last formal is a block parameter.
    pub synthetic: bool,
}

/// A formal method parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamInfo {
    pub name: String,
    pub ty: Option<Ty>,
    pub flags: ParamFlags,
    pub loc: Option<Loc>,
}

impl ParamInfo {
    fn with_flags(name: impl Into<String>, ty: Option<Ty>, flags: ParamFlags) -> ParamInfo {
        ParamInfo {
            name: name.into(),
            ty,
            flags,
            loc: None,
        }
    }

    /// A required positional parameter.
    pub fn positional(name: impl Into<String>, ty: Ty) -> ParamInfo {
        ParamInfo::with_flags(name, Some(ty), ParamFlags::default())
    }

    /// An optional positional parameter (has a default value).
    pub fn optional(name: impl Into<String>, ty: Ty) -> ParamInfo {
        ParamInfo::with_flags(
            name,
            Some(ty),
            ParamFlags {
                default: true,
                ..ParamFlags::default()
            },
        )
    }

    /// A rest parameter (`*args`).
    pub fn rest(name: impl Into<String>, ty: Ty) -> ParamInfo {
        ParamInfo::with_flags(
            name,
            Some(ty),
            ParamFlags {
                repeated: true,
                ..ParamFlags::default()
            },
        )
    }

    /// A required keyword parameter.
    pub fn keyword(name: impl Into<String>, ty: Ty) -> ParamInfo {
        ParamInfo::with_flags(
            name,
            Some(ty),
            ParamFlags {
                keyword: true,
                ..ParamFlags::default()
            },
        )
    }

    /// A keyword parameter with a default.
    pub fn keyword_default(name: impl Into<String>, ty: Ty) -> ParamInfo {
        ParamInfo::with_flags(
            name,
            Some(ty),
            ParamFlags {
                keyword: true,
                default: true,
                ..ParamFlags::default()
            },
        )
    }

    /// A keyword rest parameter (`**kwargs`).
    pub fn keyword_rest(name: impl Into<String>, ty: Ty) -> ParamInfo {
        ParamInfo::with_flags(
            name,
            Some(ty),
            ParamFlags {
                keyword: true,
                repeated: true,
                ..ParamFlags::default()
            },
        )
    }

    /// An explicit block parameter.
    pub fn block(name: impl Into<String>, ty: Ty) -> ParamInfo {
        ParamInfo::with_flags(
            name,
            Some(ty),
            ParamFlags {
                block: true,
                ..ParamFlags::default()
            },
        )
    }

    /// The block parameter synthesized for methods that never mention one.
    pub fn synthetic_block() -> ParamInfo {
        ParamInfo::with_flags(
            "<blk>",
            None,
            ParamFlags {
                block: true,
                synthetic: true,
                ..ParamFlags::default()
            },
        )
    }

    /// The name rendered into diagnostics.
    pub fn argument_name(&self) -> &str {
        &self.name
    }
}

// ── Symbols ────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ClassDef {
    pub name: String,
    pub superclass: Option<ClassRef>,
    pub is_module: bool,
    /// Classes whose values stand for themselves in type syntax.
    pub is_enum: bool,
    /// Own instance members; inherited members resolve through
    /// `find_member_transitive`.
    pub members: FxHashMap<String, MethodRef>,
    pub includes: Vec<ClassRef>,
    pub type_members: Vec<TypeMemberRef>,
    pub singleton_class: Option<ClassRef>,
    /// For a singleton class, the instance class it is the class of.
    pub attached_class: Option<ClassRef>,
    pub required_ancestors: Vec<ClassRef>,
    pub loc: Option<Loc>,
}

#[derive(Clone, Debug)]
pub struct MethodDef {
    pub name: String,
    pub owner: ClassRef,
    /// Invariant: the last parameter is always a block parameter, possibly
    /// synthetic.
    pub params: Vec<ParamInfo>,
    pub result_type: Option<Ty>,
    /// Additional signatures selectable by arity. The primary definition is
    /// not repeated here.
    pub overloads: Vec<MethodRef>,
    pub type_params: Vec<TypeParamId>,
    pub intrinsic: Option<IntrinsicId>,
    pub has_sig: bool,
    pub loc: Option<Loc>,
}

impl MethodDef {
    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }

    pub fn is_overloaded(&self) -> bool {
        !self.overloads.is_empty()
    }

    /// Number of non-block formals.
    pub fn arity(&self) -> usize {
        self.params.len() - 1
    }

    pub fn block_param(&self) -> &ParamInfo {
        self.params.last().expect("every method has a block param")
    }

    pub fn has_keyword_params(&self) -> bool {
        self.params.iter().any(|p| p.flags.keyword)
    }
}

#[derive(Clone, Debug)]
pub struct TypeMemberDef {
    pub name: String,
    pub owner: ClassRef,
    pub upper: Ty,
    pub lower: Ty,
    /// Fixed members are implicitly applied and never consume an explicit
    /// type argument.
    pub fixed: bool,
    pub loc: Option<Loc>,
}

#[derive(Clone, Debug)]
pub struct TypeParamDef {
    pub name: String,
}

// ── Files and options ──────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
    pub strict: StrictLevel,
    pub permits_overloads: bool,
}

/// Behavior knobs for the checker. Plain struct; the embedder fills it in.
#[derive(Clone, Debug)]
pub struct CheckOptions {
    /// Treat a trailing `**`-less keyword hash as deprecated and offer the
    /// splat autocorrect.
    pub strict_keyword_args: bool,
    /// When set, suggest wrapping failing receivers/arguments in this
    /// helper instead of the default nil-stripping `T.must`.
    pub suggest_unsafe: Option<String>,
    /// Scan required ancestors when ordinary member lookup fails.
    pub required_ancestors: bool,
    /// Allow a non-shape hash to satisfy a `**kwargs` rest parameter.
    /// Off by default: the stock behavior never allows it, even for an
    /// untyped keyword rest.
    pub non_shape_kwargs_satisfy_rest: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        CheckOptions {
            strict_keyword_args: false,
            suggest_unsafe: None,
            required_ancestors: false,
            non_shape_kwargs_satisfy_rest: false,
        }
    }
}

/// Well-known classes, resolved once at startup.
#[derive(Copy, Clone, Debug)]
pub struct Builtins {
    pub object: ClassRef,
    pub module: ClassRef,
    pub class: ClassRef,
    pub integer: ClassRef,
    pub float: ClassRef,
    pub string: ClassRef,
    pub symbol: ClassRef,
    pub bool: ClassRef,
    pub nil_class: ClassRef,
    pub hash: ClassRef,
    pub array: ClassRef,
    pub range: ClassRef,
    pub proc: ClassRef,
    pub tuple: ClassRef,
    pub shape: ClassRef,
    pub t: ClassRef,
    pub t_helpers: ClassRef,
    pub magic: ClassRef,
}

// ── Symbol table ───────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    classes: Vec<ClassDef>,
    methods: Vec<MethodDef>,
    type_members: Vec<TypeMemberDef>,
    type_params: Vec<TypeParamDef>,
}

impl SymbolTable {
    pub fn class(&self, c: ClassRef) -> &ClassDef {
        &self.classes[c.0 as usize]
    }

    pub fn class_mut(&mut self, c: ClassRef) -> &mut ClassDef {
        &mut self.classes[c.0 as usize]
    }

    pub fn method(&self, m: MethodRef) -> &MethodDef {
        &self.methods[m.0 as usize]
    }

    pub fn method_mut(&mut self, m: MethodRef) -> &mut MethodDef {
        &mut self.methods[m.0 as usize]
    }

    pub fn type_member(&self, m: TypeMemberRef) -> &TypeMemberDef {
        &self.type_members[m.0 as usize]
    }

    pub fn type_param(&self, p: TypeParamId) -> &TypeParamDef {
        &self.type_params[p.0 as usize]
    }

    pub fn define_class(&mut self, name: impl Into<String>, superclass: Option<ClassRef>) -> ClassRef {
        let id = ClassRef(self.classes.len() as u32);
        self.classes.push(ClassDef {
            name: name.into(),
            superclass,
            is_module: false,
            is_enum: false,
            members: FxHashMap::default(),
            includes: Vec::new(),
            type_members: Vec::new(),
            singleton_class: None,
            attached_class: None,
            required_ancestors: Vec::new(),
            loc: None,
        });
        id
    }

    pub fn define_module(&mut self, name: impl Into<String>) -> ClassRef {
        let id = self.define_class(name, None);
        self.class_mut(id).is_module = true;
        id
    }

    /// Define a method on `owner`. Appends a synthetic block parameter when
    /// the signature does not end in an explicit one, preserving the
    /// invariant that the last formal is always a block parameter.
    pub fn define_method(
        &mut self,
        owner: ClassRef,
        name: impl Into<String>,
        mut params: Vec<ParamInfo>,
        result_type: Option<Ty>,
    ) -> MethodRef {
        let name = name.into();
        if !params.last().map(|p| p.flags.block).unwrap_or(false) {
            params.push(ParamInfo::synthetic_block());
        }
        let id = MethodRef(self.methods.len() as u32);
        self.methods.push(MethodDef {
            name: name.clone(),
            owner,
            params,
            result_type,
            overloads: Vec::new(),
            type_params: Vec::new(),
            intrinsic: None,
            has_sig: true,
            loc: None,
        });
        self.class_mut(owner).members.insert(name, id);
        id
    }

    /// Define an alternative signature for `primary`, selectable by the
    /// overload resolver. The overload itself is not entered into the
    /// owner's member map.
    pub fn define_overload(
        &mut self,
        primary: MethodRef,
        mut params: Vec<ParamInfo>,
        result_type: Option<Ty>,
    ) -> MethodRef {
        if !params.last().map(|p| p.flags.block).unwrap_or(false) {
            params.push(ParamInfo::synthetic_block());
        }
        let owner = self.method(primary).owner;
        let name = self.method(primary).name.clone();
        let id = MethodRef(self.methods.len() as u32);
        self.methods.push(MethodDef {
            name,
            owner,
            params,
            result_type,
            overloads: Vec::new(),
            type_params: Vec::new(),
            intrinsic: None,
            has_sig: true,
            loc: None,
        });
        self.method_mut(primary).overloads.push(id);
        id
    }

    pub fn define_type_member(
        &mut self,
        owner: ClassRef,
        name: impl Into<String>,
        upper: Ty,
        lower: Ty,
    ) -> TypeMemberRef {
        let id = TypeMemberRef(self.type_members.len() as u32);
        self.type_members.push(TypeMemberDef {
            name: name.into(),
            owner,
            upper,
            lower,
            fixed: false,
            loc: None,
        });
        self.class_mut(owner).type_members.push(id);
        id
    }

    pub fn define_type_param(&mut self, name: impl Into<String>) -> TypeParamId {
        let id = TypeParamId(self.type_params.len() as u32);
        self.type_params.push(TypeParamDef { name: name.into() });
        id
    }

    /// The singleton class of `c`, created on first use. The singleton of a
    /// subclass derives from the singleton of its superclass; the chain is
    /// rooted at `Class`. Every singleton carries an `AttachedClass` type
    /// member so that constructor intrinsics can name "the class this is
    /// the class of".
    pub fn singleton_class(&mut self, c: ClassRef, class_builtin: ClassRef) -> ClassRef {
        if let Some(s) = self.class(c).singleton_class {
            return s;
        }
        let super_singleton = match self.class(c).superclass {
            Some(sup) => self.singleton_class(sup, class_builtin),
            None => class_builtin,
        };
        let name = format!("<Class:{}>", self.class(c).name);
        let singleton = self.define_class(name, Some(super_singleton));
        self.class_mut(singleton).attached_class = Some(c);
        self.class_mut(c).singleton_class = Some(singleton);
        let external = self.external_type(c);
        self.define_type_member(singleton, "AttachedClass", external, Ty::Bottom);
        singleton
    }

    /// Nominal ancestry: superclass chain plus transitive includes.
    pub fn derives_from(&self, a: ClassRef, b: ClassRef) -> bool {
        if a == b {
            return true;
        }
        let mut seen = FxHashSet::default();
        let mut work = vec![a];
        while let Some(c) = work.pop() {
            if c == b {
                return true;
            }
            if !seen.insert(c) {
                continue;
            }
            let def = self.class(c);
            work.extend(def.includes.iter().copied());
            if let Some(sup) = def.superclass {
                work.push(sup);
            }
        }
        false
    }

    /// Ancestors in method-resolution order: self, includes (declaration
    /// order), then the superclass's ancestors.
    pub fn ancestors(&self, c: ClassRef) -> Vec<ClassRef> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        let mut work = vec![c];
        while let Some(cur) = work.pop() {
            if !seen.insert(cur) {
                continue;
            }
            out.push(cur);
            let def = self.class(cur);
            if let Some(sup) = def.superclass {
                work.push(sup);
            }
            for inc in def.includes.iter().rev() {
                work.push(*inc);
            }
        }
        out
    }

    pub fn find_member(&self, c: ClassRef, name: &str) -> Option<MethodRef> {
        self.class(c).members.get(name).copied()
    }

    pub fn find_member_transitive(&self, c: ClassRef, name: &str) -> Option<MethodRef> {
        for anc in self.ancestors(c) {
            if let Some(m) = self.class(anc).members.get(name) {
                return Some(*m);
            }
        }
        None
    }

    /// "Did you mean" candidates by edit distance over the full ancestry's
    /// member names, closest first.
    pub fn find_member_fuzzy_match(&self, c: ClassRef, name: &str) -> Vec<MethodRef> {
        let max_dist = match name.len() {
            0..=3 => 1,
            4..=6 => 2,
            7..=10 => 3,
            _ => 4,
        };
        let mut scored: Vec<(usize, &str, MethodRef)> = Vec::new();
        let mut seen = FxHashSet::default();
        for anc in self.ancestors(c) {
            for (member_name, method) in &self.class(anc).members {
                if member_name == name || !seen.insert(member_name.clone()) {
                    continue;
                }
                let dist = strsim::levenshtein(name, member_name);
                if dist <= max_dist {
                    scored.push((dist, member_name, *method));
                }
            }
        }
        scored.sort_by(|(da, na, _), (db, nb, _)| da.cmp(db).then(na.cmp(nb)));
        scored.into_iter().take(3).map(|(_, _, m)| m).collect()
    }

    /// The canonical instance type of a class: the class itself, or the
    /// generic applied to its type members' upper bounds.
    pub fn external_type(&self, c: ClassRef) -> Ty {
        let def = self.class(c);
        if def.type_members.is_empty() {
            Ty::Class(c)
        } else {
            let args = def
                .type_members
                .iter()
                .map(|m| self.type_member(*m).upper.clone())
                .collect();
            Ty::Applied(c, args)
        }
    }

    /// Number of non-fixed type members.
    pub fn type_arity(&self, c: ClassRef) -> usize {
        self.class(c)
            .type_members
            .iter()
            .filter(|m| !self.type_member(**m).fixed)
            .count()
    }

    pub fn find_type_member(&self, c: ClassRef, name: &str) -> Option<TypeMemberRef> {
        self.class(c)
            .type_members
            .iter()
            .copied()
            .find(|m| self.type_member(*m).name == name)
    }

    /// Required ancestors, transitively.
    pub fn required_ancestors_transitive(&self, c: ClassRef) -> Vec<ClassRef> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        let mut work: Vec<ClassRef> = self.class(c).required_ancestors.clone();
        while let Some(cur) = work.pop() {
            if !seen.insert(cur) {
                continue;
            }
            out.push(cur);
            work.extend(self.class(cur).required_ancestors.iter().copied());
        }
        out
    }

    /// Render a method as `Owner#name`, or `Owner.name` through the
    /// singleton.
    pub fn show_method(&self, m: MethodRef) -> String {
        let def = self.method(m);
        let owner = self.class(def.owner);
        match owner.attached_class {
            Some(attached) => format!("{}.{}", self.class(attached).name, def.name),
            None => format!("{}#{}", owner.name, def.name),
        }
    }
}

// ── Global environment ─────────────────────────────────────────────────

/// Everything a dispatch reads: symbols, source files, and options.
#[derive(Clone, Debug)]
pub struct GlobalEnv {
    pub symbols: SymbolTable,
    pub options: CheckOptions,
    files: Vec<SourceFile>,
    builtins: Builtins,
}

impl GlobalEnv {
    /// Build an environment with the well-known class set registered.
    /// Intrinsic-bearing methods are attached separately by the dispatch
    /// core's registry.
    pub fn with_builtins() -> GlobalEnv {
        let mut st = SymbolTable::default();

        let object = st.define_class("Object", None);
        let module = st.define_class("Module", Some(object));
        let class = st.define_class("Class", Some(module));
        let integer = st.define_class("Integer", Some(object));
        let float = st.define_class("Float", Some(object));
        let string = st.define_class("String", Some(object));
        let symbol = st.define_class("Symbol", Some(object));
        let bool_ = st.define_class("Bool", Some(object));
        let nil_class = st.define_class("NilClass", Some(object));
        let hash = st.define_class("Hash", Some(object));
        let array = st.define_class("Array", Some(object));
        let range = st.define_class("Range", Some(object));
        let proc = st.define_class("Proc", Some(object));
        let tuple = st.define_class("Tuple", Some(array));
        let shape = st.define_class("Shape", Some(hash));
        let t = st.define_module("T");
        let t_helpers = st.define_module("T::Helpers");
        let magic = st.define_module("Magic");

        st.define_type_member(hash, "K", Ty::untyped(), Ty::Bottom);
        st.define_type_member(hash, "V", Ty::untyped(), Ty::Bottom);
        st.define_type_member(array, "Elem", Ty::untyped(), Ty::Bottom);
        st.define_type_member(range, "Elem", Ty::untyped(), Ty::Bottom);

        GlobalEnv {
            symbols: st,
            options: CheckOptions::default(),
            files: Vec::new(),
            builtins: Builtins {
                object,
                module,
                class,
                integer,
                float,
                string,
                symbol,
                bool: bool_,
                nil_class,
                hash,
                array,
                range,
                proc,
                tuple,
                shape,
                t,
                t_helpers,
                magic,
            },
        }
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn add_file(
        &mut self,
        name: impl Into<String>,
        text: impl Into<String>,
        strict: StrictLevel,
    ) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile {
            name: name.into(),
            text: text.into(),
            strict,
            permits_overloads: true,
        });
        id
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.0 as usize]
    }

    pub fn file_mut(&mut self, id: FileId) -> &mut SourceFile {
        &mut self.files[id.0 as usize]
    }

    /// The source text under a location, when the range is in bounds.
    pub fn source(&self, loc: Loc) -> Option<&str> {
        let text = &self.files.get(loc.file.0 as usize)?.text;
        let start: usize = loc.range.start().into();
        let end: usize = loc.range.end().into();
        if start <= end && end <= text.len() {
            Some(&text[start..end])
        } else {
            None
        }
    }

    /// Convenience for defining the singleton class against the builtin
    /// `Class` root.
    pub fn singleton_class(&mut self, c: ClassRef) -> ClassRef {
        let class_builtin = self.builtins.class;
        self.symbols.singleton_class(c, class_builtin)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

//! Raw CIL: opcodes, method body headers, and the type-signature blob
//! grammar (ECMA-335 §II.23.2, §III.1, §III.2.3).
//!
//! This is the last metadata-layer module before the type-system view and
//! the ILAst: everything here models bytes as ECMA-335 describes them, with
//! no attempt yet at the higher-level tree shape the rest of the crate
//! builds on top.

use std::io::{Cursor, Read};
use std::sync::Arc;

use ilcore_derive::FromRepr;

use crate::metadata::token::TypeDefOrRef;
use crate::metadata::{read_compressed_i32, read_compressed_u32, FromByteStream};

macro_rules! define_opcodes {
	($($name: ident = $code: literal $(, $fe_name: ident = $fe_code: literal)?);* $(;)?) => {
		/// A single CIL instruction opcode, one-to-one with the mnemonics in
		/// ECMA-335 Partition III, §3.
		#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
		pub enum OpCode {
			$($name,)*
		}

		impl OpCode {
			fn from_single_byte(byte: u8) -> Option<Self> {
				match byte {
					$($code => Some(Self::$name),)*
					_ => None,
				}
			}
		}
	};
}

// A representative slice of ECMA-335's ~220 opcodes: enough to drive the
// instruction-tree builder, the dataflow framework and the transform
// passes the rest of this crate implements. Opcodes outside this set parse
// as `OpCode::Unknown(byte)` rather than failing the whole method body.
define_opcodes! {
	Nop = 0x00;
	Break = 0x01;
	Ldarg0 = 0x02;
	Ldarg1 = 0x03;
	Ldarg2 = 0x04;
	Ldarg3 = 0x05;
	Ldloc0 = 0x06;
	Ldloc1 = 0x07;
	Ldloc2 = 0x08;
	Ldloc3 = 0x09;
	Stloc0 = 0x0a;
	Stloc1 = 0x0b;
	Stloc2 = 0x0c;
	Stloc3 = 0x0d;
	LdargS = 0x0e;
	LdargaS = 0x0f;
	StargS = 0x10;
	LdlocS = 0x11;
	LdlocaS = 0x12;
	StlocS = 0x13;
	Ldnull = 0x14;
	LdcI4M1 = 0x15;
	LdcI40 = 0x16;
	LdcI41 = 0x17;
	LdcI42 = 0x18;
	LdcI43 = 0x19;
	LdcI44 = 0x1a;
	LdcI45 = 0x1b;
	LdcI46 = 0x1c;
	LdcI47 = 0x1d;
	LdcI48 = 0x1e;
	LdcI4S = 0x1f;
	LdcI4 = 0x20;
	LdcI8 = 0x21;
	LdcR4 = 0x22;
	LdcR8 = 0x23;
	Dup = 0x25;
	Pop = 0x26;
	Jmp = 0x27;
	Call = 0x28;
	Calli = 0x29;
	Ret = 0x2a;
	BrS = 0x2b;
	BrfalseS = 0x2c;
	BrtrueS = 0x2d;
	BeqS = 0x2e;
	BgeS = 0x2f;
	BgtS = 0x30;
	BleS = 0x31;
	BltS = 0x32;
	BneUnS = 0x33;
	BgeUnS = 0x34;
	BgtUnS = 0x35;
	BleUnS = 0x36;
	BltUnS = 0x37;
	Br = 0x38;
	Brfalse = 0x39;
	Brtrue = 0x3a;
	Beq = 0x3b;
	Bge = 0x3c;
	Bgt = 0x3d;
	Ble = 0x3e;
	Blt = 0x3f;
	BneUn = 0x40;
	BgeUn = 0x41;
	BgtUn = 0x42;
	BleUn = 0x43;
	BltUn = 0x44;
	Switch = 0x45;
	LdindI1 = 0x46;
	LdindU1 = 0x47;
	LdindI2 = 0x48;
	LdindU2 = 0x49;
	LdindI4 = 0x4a;
	LdindU4 = 0x4b;
	LdindI8 = 0x4c;
	LdindI = 0x4d;
	LdindR4 = 0x4e;
	LdindR8 = 0x4f;
	LdindRef = 0x50;
	StindRef = 0x51;
	StindI1 = 0x52;
	StindI2 = 0x53;
	StindI4 = 0x54;
	StindI8 = 0x55;
	StindR4 = 0x56;
	StindR8 = 0x57;
	Add = 0x58;
	Sub = 0x59;
	Mul = 0x5a;
	Div = 0x5b;
	DivUn = 0x5c;
	Rem = 0x5d;
	RemUn = 0x5e;
	And = 0x5f;
	Or = 0x60;
	Xor = 0x61;
	Shl = 0x62;
	Shr = 0x63;
	ShrUn = 0x64;
	Neg = 0x65;
	Not = 0x66;
	ConvI1 = 0x67;
	ConvI2 = 0x68;
	ConvI4 = 0x69;
	ConvI8 = 0x6a;
	ConvR4 = 0x6b;
	ConvR8 = 0x6c;
	ConvU4 = 0x6d;
	ConvU8 = 0x6e;
	Callvirt = 0x6f;
	Cpobj = 0x70;
	Ldobj = 0x71;
	Ldstr = 0x72;
	Newobj = 0x73;
	Castclass = 0x74;
	Isinst = 0x75;
	ConvRUn = 0x76;
	Unbox = 0x79;
	Throw = 0x7a;
	Ldfld = 0x7b;
	Ldflda = 0x7c;
	Stfld = 0x7d;
	Ldsfld = 0x7e;
	Ldsflda = 0x7f;
	Stsfld = 0x80;
	Stobj = 0x81;
	Box = 0x8c;
	Newarr = 0x8d;
	Ldlen = 0x8e;
	Ldelema = 0x8f;
	LdelemI1 = 0x90;
	LdelemU1 = 0x91;
	LdelemI2 = 0x92;
	LdelemU2 = 0x93;
	LdelemI4 = 0x94;
	LdelemU4 = 0x95;
	LdelemI8 = 0x96;
	LdelemI = 0x97;
	LdelemR4 = 0x98;
	LdelemR8 = 0x99;
	LdelemRef = 0x9a;
	StelemI = 0x9b;
	StelemI1 = 0x9c;
	StelemI2 = 0x9d;
	StelemI4 = 0x9e;
	StelemI8 = 0x9f;
	StelemR4 = 0xa0;
	StelemR8 = 0xa1;
	StelemRef = 0xa2;
	Ldelem = 0xa3;
	Stelem = 0xa4;
	UnboxAny = 0xa5;
	ConvOvfI1 = 0xb3;
	ConvOvfU1 = 0xb4;
	ConvOvfI2 = 0xb5;
	ConvOvfU2 = 0xb6;
	ConvOvfI4 = 0xb7;
	ConvOvfU4 = 0xb8;
	ConvOvfI8 = 0xb9;
	ConvOvfU8 = 0xba;
	Refanyval = 0xc2;
	Ckfinite = 0xc3;
	Mkrefany = 0xc6;
	Ldtoken = 0xd0;
	ConvU2 = 0xd1;
	ConvU1 = 0xd2;
	ConvI = 0xd3;
	ConvOvfI = 0xd4;
	ConvOvfU = 0xd5;
	AddOvf = 0xd6;
	AddOvfUn = 0xd7;
	MulOvf = 0xd8;
	MulOvfUn = 0xd9;
	SubOvf = 0xda;
	SubOvfUn = 0xdb;
	Endfinally = 0xdc;
	Leave = 0xdd;
	LeaveS = 0xde;
	StindI = 0xdf;
	ConvU = 0xe0;
}

/// The 0xFE-prefixed two-byte opcode space (ECMA-335 §III.1.2).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CompoundOpCode {
	Arglist,
	Ceq,
	Cgt,
	CgtUn,
	Clt,
	CltUn,
	Ldftn,
	Ldvirtftn,
	LdargExt,
	LdargaExt,
	StargExt,
	LdlocExt,
	LdlocaExt,
	StlocExt,
	Localloc,
	Endfilter,
	Unaligned,
	Volatile,
	Tailcall,
	Initobj,
	Constrained,
	Cpblk,
	Initblk,
	Rethrow,
	Sizeof,
	Refanytype,
	Readonly,
}

impl CompoundOpCode {
	fn from_second_byte(byte: u8) -> Option<Self> {
		Some(match byte {
			0x00 => Self::Arglist,
			0x01 => Self::Ceq,
			0x02 => Self::Cgt,
			0x03 => Self::CgtUn,
			0x04 => Self::Clt,
			0x05 => Self::CltUn,
			0x06 => Self::Ldftn,
			0x07 => Self::Ldvirtftn,
			0x09 => Self::LdargExt,
			0x0a => Self::LdargaExt,
			0x0b => Self::StargExt,
			0x0c => Self::LdlocExt,
			0x0d => Self::LdlocaExt,
			0x0e => Self::StlocExt,
			0x0f => Self::Localloc,
			0x11 => Self::Endfilter,
			0x12 => Self::Unaligned,
			0x13 => Self::Volatile,
			0x14 => Self::Tailcall,
			0x15 => Self::Initobj,
			0x16 => Self::Constrained,
			0x17 => Self::Cpblk,
			0x18 => Self::Initblk,
			0x1a => Self::Rethrow,
			0x1c => Self::Sizeof,
			0x1d => Self::Refanytype,
			0x1e => Self::Readonly,
			_ => return None,
		})
	}
}

/// An opcode that takes an inline operand. Bodies store operands
/// independently (keyed by instruction offset), so this type is the
/// decoded *shape*, not a byte-exact copy of the stream.
#[derive(Debug, Clone)]
pub enum Instruction {
	Plain(OpCode),
	CompoundPlain(CompoundOpCode),
	Branch { opcode: OpCode, target: u32 },
	BranchShort { opcode: OpCode, target: u32 },
	Switch { targets: Vec<u32> },
	LoadInt32 { opcode: OpCode, value: i32 },
	LoadInt64(i64),
	LoadFloat32(f32),
	LoadFloat64(f64),
	LoadString(crate::metadata::heaps::string::UserStringIndex),
	Variable { opcode: OpCode, index: u16 },
	VariableExt { opcode: CompoundOpCode, index: u16 },
	Token { opcode: OpCode, token: u32 },
	TokenCompound { opcode: CompoundOpCode, token: u32 },
	Unknown(u8),
}

/// One decoded instruction plus its byte offset in the method body, the
/// unit the IL-tree builder walks over to recover control flow.
#[derive(Debug, Clone)]
pub struct RawInstruction {
	pub offset: u32,
	pub size: u32,
	pub instruction: Instruction,
}

/// Requires unsigned branches (`Switch`, `Brfalse`/`Brtrue`, unsigned
/// comparisons) and signed ones to be kept distinct, since IL does not
/// reuse an opcode for both.
fn opcode_takes_branch_target(opcode: OpCode) -> bool {
	use OpCode::*;
	matches!(
		opcode,
		BrS | BrfalseS | BrtrueS | BeqS | BgeS | BgtS | BleS | BltS | BneUnS | BgeUnS | BgtUnS | BleUnS
			| BltUnS | Br | Brfalse | Brtrue | Beq | Bge | Bgt | Ble | Blt | BneUn | BgeUn | BgtUn | BleUn
			| BltUn | Leave | LeaveS
	)
}

fn opcode_takes_variable_index(opcode: OpCode) -> Option<bool> {
	use OpCode::*;
	match opcode {
		LdargS | LdargaS | StargS | LdlocS | LdlocaS | StlocS => Some(true),
		_ => None,
	}
}

/// Decodes one raw method body's bytecode into a flat, offset-addressed
/// instruction stream. Building the [`crate::ilast`] tree out of this is a
/// separate, later step.
pub fn decode_instructions(code: &[u8]) -> std::io::Result<Vec<RawInstruction>> {
	let mut cursor = Cursor::new(code);
	let mut out = Vec::new();

	while (cursor.position() as usize) < code.len() {
		let offset = cursor.position() as u32;
		let mut byte = [0u8; 1];
		cursor.read_exact(&mut byte)?;

		let instruction = if byte[0] == 0xFE {
			let mut second = [0u8; 1];
			cursor.read_exact(&mut second)?;
			let opcode = CompoundOpCode::from_second_byte(second[0])
				.ok_or(std::io::ErrorKind::InvalidData)?;
			decode_compound_operand(&mut cursor, opcode)?
		} else {
			let opcode = OpCode::from_single_byte(byte[0]).ok_or(std::io::ErrorKind::InvalidData)?;
			decode_operand(&mut cursor, opcode)?
		};

		let size = cursor.position() as u32 - offset;
		out.push(RawInstruction { offset, size, instruction });
	}

	Ok(out)
}

fn decode_operand(cursor: &mut Cursor<&[u8]>, opcode: OpCode) -> std::io::Result<Instruction> {
	use OpCode::*;

	if opcode_takes_branch_target(opcode) {
		let short = matches!(
			opcode,
			BrS | BrfalseS | BrtrueS | BeqS | BgeS | BgtS | BleS | BltS | BneUnS | BgeUnS | BgtUnS
				| BleUnS | BltUnS | LeaveS
		);
		return Ok(if short {
			let delta = i8::read(cursor, &())? as i32;
			Instruction::BranchShort { opcode, target: (cursor.position() as i64 + delta as i64) as u32 }
		} else {
			let delta = i32::read(cursor, &())?;
			Instruction::Branch { opcode, target: (cursor.position() as i64 + delta as i64) as u32 }
		});
	}

	if let Some(short) = opcode_takes_variable_index(opcode) {
		let index = if short { u8::read(cursor, &())? as u16 } else { u16::read(cursor, &())? };
		return Ok(Instruction::Variable { opcode, index });
	}

	Ok(match opcode {
		Switch => {
			let count = u32::read(cursor, &())?;
			let base = cursor.position() as u32 + count * 4;
			let mut targets = Vec::with_capacity(count as usize);
			for _ in 0..count {
				let delta = i32::read(cursor, &())?;
				targets.push((base as i64 + delta as i64) as u32);
			}
			Instruction::Switch { targets }
		}
		LdcI4S => Instruction::LoadInt32 { opcode, value: i8::read(cursor, &())? as i32 },
		LdcI4 => Instruction::LoadInt32 { opcode, value: i32::read(cursor, &())? },
		LdcI8 => Instruction::LoadInt64(i64::read(cursor, &())?),
		LdcR4 => Instruction::LoadFloat32(f32::read(cursor, &())?),
		LdcR8 => Instruction::LoadFloat64(f64::read(cursor, &())?),
		Ldstr => {
			let token = u32::read(cursor, &())?;
			Instruction::LoadString(crate::metadata::heaps::string::UserStringIndex(token & 0x00FF_FFFF))
		}
		Call | Callvirt | Newobj | Ldfld | Ldflda | Stfld | Ldsfld | Ldsflda | Stsfld | Castclass
		| Isinst | Unbox | UnboxAny | Box | Newarr | Ldelema | Ldelem | Stelem | Ldobj | Stobj
		| Cpobj | Ldtoken | Calli | Jmp | Mkrefany | Refanyval => {
			Instruction::Token { opcode, token: u32::read(cursor, &())? }
		}
		other => Instruction::Plain(other),
	})
}

fn decode_compound_operand(cursor: &mut Cursor<&[u8]>, opcode: CompoundOpCode) -> std::io::Result<Instruction> {
	use CompoundOpCode::*;
	Ok(match opcode {
		LdargExt | LdargaExt | StargExt | LdlocExt | LdlocaExt | StlocExt => {
			Instruction::VariableExt { opcode, index: u16::read(cursor, &())? }
		}
		Initobj | Constrained | Sizeof | Refanytype => {
			Instruction::TokenCompound { opcode, token: u32::read(cursor, &())? }
		}
		Unaligned => {
			let _alignment = u8::read(cursor, &())?;
			Instruction::CompoundPlain(opcode)
		}
		other => Instruction::CompoundPlain(other),
	})
}

bitflags::bitflags! {
	/// Encodes a method header's tiny/fat format and local-exception-table
	/// presence per ECMA-335 §II.25.4.
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct MethodBodyFlags: u16 {
		const TINY_FORMAT = 0x02;
		const FAT_FORMAT = 0x03;
		const MORE_SECTS = 0x08;
		const INIT_LOCALS = 0x10;
	}
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExceptionHandlerKind {
	Catch(TypeDefOrRef),
	Filter { filter_offset: u32 },
	Finally,
	Fault,
}

#[derive(Debug, Clone)]
pub struct ExceptionHandler {
	pub try_offset: u32,
	pub try_length: u32,
	pub handler_offset: u32,
	pub handler_length: u32,
	pub kind: ExceptionHandlerKind,
}

#[derive(Debug, Clone)]
pub struct MethodBody {
	pub max_stack: u16,
	pub init_locals: bool,
	pub local_var_sig: Option<crate::metadata::heaps::blob::BlobIndex>,
	pub code: Vec<u8>,
	pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
	/// Reads a method body starting at the RVA-resolved offset `data`
	/// points at, per ECMA-335 §II.25.4. `data` must span at least the
	/// body; callers resolve the RVA against section headers first.
	pub fn read(data: &[u8]) -> std::io::Result<Self> {
		let mut cursor = Cursor::new(data);
		let mut first = [0u8; 1];
		cursor.read_exact(&mut first)?;

		let format = first[0] & 0x03;
		if format == 0x02 {
			// Tiny format: top 6 bits are the code size, no locals, no EH.
			let code_size = (first[0] >> 2) as usize;
			let mut code = vec![0u8; code_size];
			cursor.read_exact(&mut code)?;
			return Ok(Self { max_stack: 8, init_locals: true, local_var_sig: None, code, exception_handlers: Vec::new() });
		}

		let mut second = [0u8; 1];
		cursor.read_exact(&mut second)?;
		let flags = MethodBodyFlags::from_bits_retain(u16::from_le_bytes([first[0], second[0]]));
		let header_size = u8::read(&mut cursor, &())?; // low nibble is dword count, high is unused
		let _ = header_size;
		let max_stack = u16::read(&mut cursor, &())?;
		let code_size = u32::read(&mut cursor, &())?;
		let local_var_sig_tok = u32::read(&mut cursor, &())?;

		let mut code = vec![0u8; code_size as usize];
		cursor.read_exact(&mut code)?;

		let mut exception_handlers = Vec::new();
		if flags.contains(MethodBodyFlags::MORE_SECTS) {
			// Section headers are 4-byte aligned relative to the body start.
			let pad = (4 - (cursor.position() % 4) % 4) % 4;
			cursor.set_position(cursor.position() + pad);
			exception_handlers = read_exception_sections(&mut cursor)?;
		}

		Ok(Self {
			max_stack,
			init_locals: flags.contains(MethodBodyFlags::INIT_LOCALS),
			local_var_sig: (local_var_sig_tok != 0)
				.then(|| crate::metadata::heaps::blob::BlobIndex(local_var_sig_tok & 0x00FF_FFFF)),
			code,
			exception_handlers,
		})
	}
}

fn read_exception_sections(cursor: &mut Cursor<&[u8]>) -> std::io::Result<Vec<ExceptionHandler>> {
	let mut handlers = Vec::new();

	loop {
		let mut kind_byte = [0u8; 1];
		cursor.read_exact(&mut kind_byte)?;
		let is_fat = kind_byte[0] & 0x40 != 0;
		let more = kind_byte[0] & 0x80 != 0;

		if is_fat {
			let mut rest = [0u8; 3];
			cursor.read_exact(&mut rest)?;
			let data_size = u32::from_le_bytes([rest[0], rest[1], rest[2], 0]);
			let count = (data_size - 4) / 24;
			for _ in 0..count {
				handlers.push(read_fat_clause(cursor)?);
			}
		} else {
			let mut data_size = [0u8; 1];
			cursor.read_exact(&mut data_size)?;
			let _reserved = u16::read(cursor, &())?;
			let count = (data_size[0] as u32) / 12;
			for _ in 0..count {
				handlers.push(read_small_clause(cursor)?);
			}
		}

		if !more {
			break;
		}
	}

	Ok(handlers)
}

fn clause_kind(flags: u32, class_token_or_offset: u32) -> ExceptionHandlerKind {
	match flags {
		0 => ExceptionHandlerKind::Catch(
			TypeDefOrRef::from_token_unchecked(class_token_or_offset),
		),
		1 => ExceptionHandlerKind::Filter { filter_offset: class_token_or_offset },
		2 => ExceptionHandlerKind::Finally,
		4 => ExceptionHandlerKind::Fault,
		_ => ExceptionHandlerKind::Finally,
	}
}

fn read_fat_clause(cursor: &mut Cursor<&[u8]>) -> std::io::Result<ExceptionHandler> {
	let flags = u32::read(cursor, &())?;
	let try_offset = u32::read(cursor, &())?;
	let try_length = u32::read(cursor, &())?;
	let handler_offset = u32::read(cursor, &())?;
	let handler_length = u32::read(cursor, &())?;
	let class_token_or_offset = u32::read(cursor, &())?;
	Ok(ExceptionHandler {
		try_offset,
		try_length,
		handler_offset,
		handler_length,
		kind: clause_kind(flags, class_token_or_offset),
	})
}

fn read_small_clause(cursor: &mut Cursor<&[u8]>) -> std::io::Result<ExceptionHandler> {
	let flags = u16::read(cursor, &())? as u32;
	let try_offset = u16::read(cursor, &())? as u32;
	let try_length = u8::read(cursor, &())? as u32;
	let handler_offset = u16::read(cursor, &())? as u32;
	let handler_length = u8::read(cursor, &())? as u32;
	let class_token_or_offset = u32::read(cursor, &())?;
	Ok(ExceptionHandler {
		try_offset,
		try_length,
		handler_offset,
		handler_length,
		kind: clause_kind(flags, class_token_or_offset),
	})
}

bitflags::bitflags! {
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct CallingConvention: u8 {
		const DEFAULT = 0x0;
		const VARARG = 0x5;
		const GENERIC = 0x10;
		const HAS_THIS = 0x20;
		const EXPLICIT_THIS = 0x40;
	}
}

/// ECMA-335 §II.23.1.16 `ELEMENT_TYPE_*` tags, the vocabulary a type
/// signature blob is built out of.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, FromRepr)]
pub enum ElementType {
	End = 0x00,
	Void = 0x01,
	Boolean = 0x02,
	Char = 0x03,
	I1 = 0x04,
	U1 = 0x05,
	I2 = 0x06,
	U2 = 0x07,
	I4 = 0x08,
	U4 = 0x09,
	I8 = 0x0a,
	U8 = 0x0b,
	R4 = 0x0c,
	R8 = 0x0d,
	String = 0x0e,
	Ptr = 0x0f,
	ByRef = 0x10,
	ValueType = 0x11,
	Class = 0x12,
	Var = 0x13,
	Array = 0x14,
	GenericInst = 0x15,
	TypedByRef = 0x16,
	I = 0x18,
	U = 0x19,
	FnPtr = 0x1b,
	Object = 0x1c,
	SzArray = 0x1d,
	MVar = 0x1e,
	CModReqd = 0x1f,
	CModOpt = 0x20,
	Internal = 0x21,
	Modifier = 0x40,
	Sentinel = 0x41,
	Pinned = 0x45,
}

/// A decoded type signature. Mirrors [`ElementType`]'s shape rather than
/// the resolved [`crate::typesystem`] view: resolving `ValueType`/`Class`
/// tokens against an assembly's type-system view happens one layer up.
#[derive(Debug, Clone)]
pub enum TypeSignature {
	Primitive(ElementType),
	ValueType(TypeDefOrRef),
	Class(TypeDefOrRef),
	SzArray(Box<TypeSignature>),
	Array { element: Box<TypeSignature>, rank: u32, sizes: Vec<u32>, lower_bounds: Vec<i32> },
	Ptr(Option<Box<TypeSignature>>),
	ByRef(Box<TypeSignature>),
	Pinned(Box<TypeSignature>),
	GenericInst { generic: Box<TypeSignature>, args: Vec<TypeSignature> },
	Var(u32),
	MVar(u32),
	FnPtr(Box<MethodSignature>),
}

impl TypeSignature {
	pub fn read(cursor: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
		let mut tag_byte = [0u8; 1];
		cursor.read_exact(&mut tag_byte)?;
		let tag = ElementType::from_repr(tag_byte[0]).ok_or(std::io::ErrorKind::InvalidData)?;

		Ok(match tag {
			ElementType::ValueType => TypeSignature::ValueType(read_type_def_or_ref_from_blob(cursor)?),
			ElementType::Class => TypeSignature::Class(read_type_def_or_ref_from_blob(cursor)?),
			ElementType::SzArray => TypeSignature::SzArray(Box::new(TypeSignature::read(cursor)?)),
			ElementType::Ptr => {
				let peek = peek_is_void(cursor)?;
				TypeSignature::Ptr(if peek { None } else { Some(Box::new(TypeSignature::read(cursor)?)) })
			}
			ElementType::ByRef => TypeSignature::ByRef(Box::new(TypeSignature::read(cursor)?)),
			ElementType::Pinned => TypeSignature::Pinned(Box::new(TypeSignature::read(cursor)?)),
			ElementType::Var => TypeSignature::Var(read_compressed_u32(cursor)?),
			ElementType::MVar => TypeSignature::MVar(read_compressed_u32(cursor)?),
			ElementType::GenericInst => {
				let generic = Box::new(TypeSignature::read(cursor)?);
				let count = read_compressed_u32(cursor)?;
				let args = (0..count).map(|_| TypeSignature::read(cursor)).collect::<std::io::Result<_>>()?;
				TypeSignature::GenericInst { generic, args }
			}
			ElementType::Array => {
				let element = Box::new(TypeSignature::read(cursor)?);
				let rank = read_compressed_u32(cursor)?;
				let num_sizes = read_compressed_u32(cursor)?;
				let sizes = (0..num_sizes).map(|_| read_compressed_u32(cursor)).collect::<std::io::Result<_>>()?;
				let num_lower = read_compressed_u32(cursor)?;
				let lower_bounds = (0..num_lower).map(|_| read_compressed_i32(cursor)).collect::<std::io::Result<_>>()?;
				TypeSignature::Array { element, rank, sizes, lower_bounds }
			}
			ElementType::FnPtr => TypeSignature::FnPtr(Box::new(MethodSignature::read(cursor)?)),
			primitive => TypeSignature::Primitive(primitive),
		})
	}
}

fn peek_is_void(cursor: &mut Cursor<&[u8]>) -> std::io::Result<bool> {
	let pos = cursor.position();
	let mut byte = [0u8; 1];
	cursor.read_exact(&mut byte)?;
	cursor.set_position(pos);
	Ok(byte[0] == ElementType::Void as u8)
}

fn read_type_def_or_ref_from_blob(cursor: &mut Cursor<&[u8]>) -> std::io::Result<TypeDefOrRef> {
	// ECMA-335 §II.23.2.8: a TypeDefOrRef coded index inside a signature is
	// itself compressed, distinct from the fixed-width form used in table
	// rows (`CodedIndex::read`), so it is decoded by hand here instead of
	// going through `FromByteStream`.
	let value = read_compressed_u32(cursor)?;
	let tag = value & 0x3;
	let row = (value >> 2) as usize;
	let table = match tag {
		0 => crate::metadata::heaps::table::TableTag::TypeDef,
		1 => crate::metadata::heaps::table::TableTag::TypeRef,
		2 => crate::metadata::heaps::table::TableTag::TypeSpec,
		_ => return Err(std::io::ErrorKind::InvalidData.into()),
	};
	Ok(TypeDefOrRef::from_token_unchecked(
		crate::metadata::token::MetadataToken::new(table, row).raw(),
	))
}

#[derive(Debug, Clone)]
pub struct MethodSignature {
	pub calling_convention: CallingConvention,
	pub generic_param_count: u32,
	pub return_type: TypeSignature,
	pub params: Vec<TypeSignature>,
}

impl MethodSignature {
	pub fn read(cursor: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
		let mut byte = [0u8; 1];
		cursor.read_exact(&mut byte)?;
		let calling_convention = CallingConvention::from_bits_retain(byte[0]);

		let generic_param_count =
			if calling_convention.contains(CallingConvention::GENERIC) { read_compressed_u32(cursor)? } else { 0 };

		let param_count = read_compressed_u32(cursor)?;
		let return_type = TypeSignature::read(cursor)?;
		let params = (0..param_count).map(|_| TypeSignature::read(cursor)).collect::<std::io::Result<_>>()?;

		Ok(Self { calling_convention, generic_param_count, return_type, params })
	}
}

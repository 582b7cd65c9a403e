//! Arrow IPC serialization for solver communication.
//!
//! A program travels as a sequence of length-prefixed Arrow IPC streams, each
//! holding one record batch with its natural row count:
//!
//! - Stream 0: metadata (1 row)
//! - Stream 1: variables (n_var rows)
//! - Stream 2: constraints (n_con rows)
//! - Stream 3: constraint coefficients in coordinate form (nnz rows)
//! - Stream 4: solver options (n_opt rows)
//!
//! A solution is two streams: metadata (1 row) and variable values.
//!
//! Every stream is framed as `[len: u32 LE][arrow ipc stream]`.

use crate::error::{SolverError, SolverResult};
use crate::program::{Constraint, LinearExpr, LinearProgram, Sense, VarId, VarKind, Variable};
use crate::solution::{ProgramSolution, SolutionStatus};
use arrow::array::{Array, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

pub mod schema {
    use super::*;

    pub fn metadata() -> Schema {
        Schema::new(vec![
            Field::new("protocol_version", DataType::Int32, false),
            Field::new("timeout_seconds", DataType::Int64, false),
            Field::new("objective_constant", DataType::Float64, false),
            Field::new("solver", DataType::Utf8, false),
        ])
    }

    pub fn variables() -> Schema {
        Schema::new(vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("kind", DataType::Int32, false),
            Field::new("lower", DataType::Float64, false),
            Field::new("upper", DataType::Float64, false),
            Field::new("objective", DataType::Float64, false),
        ])
    }

    pub fn constraints() -> Schema {
        Schema::new(vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("sense", DataType::Utf8, false),
            Field::new("rhs", DataType::Float64, false),
        ])
    }

    pub fn coefficients() -> Schema {
        Schema::new(vec![
            Field::new("row", DataType::Int64, false),
            Field::new("col", DataType::Int64, false),
            Field::new("value", DataType::Float64, false),
        ])
    }

    pub fn options() -> Schema {
        Schema::new(vec![
            Field::new("key", DataType::Utf8, false),
            Field::new("value", DataType::Utf8, false),
        ])
    }

    pub fn solution_metadata() -> Schema {
        Schema::new(vec![
            Field::new("status", DataType::Utf8, false),
            Field::new("objective", DataType::Float64, false),
            Field::new("solve_time_ms", DataType::Int64, false),
            Field::new("solver", DataType::Utf8, false),
            Field::new("message", DataType::Utf8, true),
        ])
    }

    pub fn solution_values() -> Schema {
        Schema::new(vec![Field::new("value", DataType::Float64, false)])
    }
}

fn write_stream<W: Write>(writer: &mut W, schema: Arc<Schema>, batch: RecordBatch) -> SolverResult<()> {
    let mut buf = Vec::new();
    let mut ipc_writer = StreamWriter::try_new(&mut buf, &schema)?;
    ipc_writer.write(&batch)?;
    ipc_writer.finish()?;
    drop(ipc_writer);

    let len = buf.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&buf)?;
    Ok(())
}

fn read_stream<R: Read>(reader: &mut R) -> SolverResult<RecordBatch> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;

    let mut stream_reader = StreamReader::try_new(Cursor::new(buf), None)?;
    match stream_reader.next() {
        Some(batch) => Ok(batch?),
        None => Err(SolverError::Ipc("Empty IPC stream".to_string())),
    }
}

fn f64_column(batch: &RecordBatch, name: &str) -> SolverResult<Vec<f64>> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<Float64Array>())
        .map(|arr| arr.values().to_vec())
        .ok_or_else(|| SolverError::Ipc(format!("missing Float64 column '{}'", name)))
}

fn i64_column(batch: &RecordBatch, name: &str) -> SolverResult<Vec<i64>> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<Int64Array>())
        .map(|arr| arr.values().to_vec())
        .ok_or_else(|| SolverError::Ipc(format!("missing Int64 column '{}'", name)))
}

fn i32_column(batch: &RecordBatch, name: &str) -> SolverResult<Vec<i32>> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<Int32Array>())
        .map(|arr| arr.values().to_vec())
        .ok_or_else(|| SolverError::Ipc(format!("missing Int32 column '{}'", name)))
}

/// Null entries come back as `None`.
fn str_column(batch: &RecordBatch, name: &str) -> SolverResult<Vec<Option<String>>> {
    let arr = batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| SolverError::Ipc(format!("missing Utf8 column '{}'", name)))?;
    Ok((0..arr.len())
        .map(|i| {
            if arr.is_null(i) {
                None
            } else {
                Some(arr.value(i).to_string())
            }
        })
        .collect())
}

fn first<T: Clone>(values: &[T], name: &str) -> SolverResult<T> {
    values
        .first()
        .cloned()
        .ok_or_else(|| SolverError::Ipc(format!("metadata column '{}' is empty", name)))
}

/// Write a program as five length-prefixed IPC streams.
pub fn write_program<W: Write>(program: &LinearProgram, mut writer: W) -> SolverResult<()> {
    let meta_schema = Arc::new(schema::metadata());
    let meta = RecordBatch::try_new(
        meta_schema.clone(),
        vec![
            Arc::new(Int32Array::from(vec![program.protocol_version])),
            Arc::new(Int64Array::from(vec![program.timeout_seconds as i64])),
            Arc::new(Float64Array::from(vec![program.objective.constant])),
            Arc::new(StringArray::from(vec![program.solver.as_str()])),
        ],
    )?;
    write_stream(&mut writer, meta_schema, meta)?;

    let var_schema = Arc::new(schema::variables());
    let vars = RecordBatch::try_new(
        var_schema.clone(),
        vec![
            Arc::new(StringArray::from(
                program.variables.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(Int32Array::from(
                program.variables.iter().map(|v| v.kind.code()).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                program.variables.iter().map(|v| v.lower).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                program.variables.iter().map(|v| v.upper).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(program.objective_coefficients())),
        ],
    )?;
    write_stream(&mut writer, var_schema, vars)?;

    let con_schema = Arc::new(schema::constraints());
    let cons = RecordBatch::try_new(
        con_schema.clone(),
        vec![
            Arc::new(StringArray::from(
                program.constraints.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                program.constraints.iter().map(|c| c.sense.symbol()).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                program.constraints.iter().map(|c| c.rhs).collect::<Vec<_>>(),
            )),
        ],
    )?;
    write_stream(&mut writer, con_schema, cons)?;

    let nnz = program.num_nonzeros();
    let (mut rows, mut cols, mut vals) = (
        Vec::with_capacity(nnz),
        Vec::with_capacity(nnz),
        Vec::with_capacity(nnz),
    );
    for (row, con) in program.constraints.iter().enumerate() {
        for (var, coef) in &con.terms {
            rows.push(row as i64);
            cols.push(var.0 as i64);
            vals.push(*coef);
        }
    }
    let coef_schema = Arc::new(schema::coefficients());
    let coefs = RecordBatch::try_new(
        coef_schema.clone(),
        vec![
            Arc::new(Int64Array::from(rows)),
            Arc::new(Int64Array::from(cols)),
            Arc::new(Float64Array::from(vals)),
        ],
    )?;
    write_stream(&mut writer, coef_schema, coefs)?;

    let opt_schema = Arc::new(schema::options());
    let opts = RecordBatch::try_new(
        opt_schema.clone(),
        vec![
            Arc::new(StringArray::from(
                program.options.keys().map(|k| k.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                program.options.values().map(|v| v.as_str()).collect::<Vec<_>>(),
            )),
        ],
    )?;
    write_stream(&mut writer, opt_schema, opts)?;

    Ok(())
}

pub fn read_program<R: Read>(mut reader: R) -> SolverResult<LinearProgram> {
    let meta = read_stream(&mut reader)?;
    let vars = read_stream(&mut reader)?;
    let cons = read_stream(&mut reader)?;
    let coefs = read_stream(&mut reader)?;
    let opts = read_stream(&mut reader)?;

    let mut program = LinearProgram::new();
    program.protocol_version = first(&i32_column(&meta, "protocol_version")?, "protocol_version")?;
    if program.protocol_version != crate::PROTOCOL_VERSION {
        return Err(SolverError::Ipc(format!(
            "protocol version mismatch: got {}, expected {}",
            program.protocol_version,
            crate::PROTOCOL_VERSION
        )));
    }
    program.timeout_seconds = first(&i64_column(&meta, "timeout_seconds")?, "timeout_seconds")?.max(0) as u64;
    let objective_constant = first(&f64_column(&meta, "objective_constant")?, "objective_constant")?;
    program.solver = first(&str_column(&meta, "solver")?, "solver")?.unwrap_or_default();

    let names = str_column(&vars, "name")?;
    let kinds = i32_column(&vars, "kind")?;
    let lowers = f64_column(&vars, "lower")?;
    let uppers = f64_column(&vars, "upper")?;
    let obj = f64_column(&vars, "objective")?;
    let mut objective = LinearExpr::constant(objective_constant);
    for i in 0..names.len() {
        let kind = VarKind::from_code(kinds[i])
            .ok_or_else(|| SolverError::Ipc(format!("unknown variable kind {}", kinds[i])))?;
        program.variables.push(Variable {
            name: names[i].clone().unwrap_or_default(),
            kind,
            lower: lowers[i],
            upper: uppers[i],
        });
        if obj[i] != 0.0 {
            objective.add_term(VarId(i), obj[i]);
        }
    }
    program.objective = objective;
    program.reindex();

    let con_names = str_column(&cons, "name")?;
    let senses = str_column(&cons, "sense")?;
    let rhs = f64_column(&cons, "rhs")?;
    for i in 0..con_names.len() {
        let symbol = senses[i].clone().unwrap_or_default();
        let sense = Sense::from_symbol(&symbol)
            .ok_or_else(|| SolverError::Ipc(format!("unknown constraint sense '{}'", symbol)))?;
        program.constraints.push(Constraint {
            name: con_names[i].clone().unwrap_or_default(),
            terms: Vec::new(),
            sense,
            rhs: rhs[i],
        });
    }

    let rows = i64_column(&coefs, "row")?;
    let cols = i64_column(&coefs, "col")?;
    let vals = f64_column(&coefs, "value")?;
    let n_var = program.variables.len();
    for ((row, col), val) in rows.into_iter().zip(cols).zip(vals) {
        let (row, col) = (row as usize, col as usize);
        if col >= n_var {
            return Err(SolverError::Ipc(format!("coefficient column {} out of range", col)));
        }
        let con = program
            .constraints
            .get_mut(row)
            .ok_or_else(|| SolverError::Ipc(format!("coefficient row {} out of range", row)))?;
        con.terms.push((VarId(col), val));
    }

    let keys = str_column(&opts, "key")?;
    let values = str_column(&opts, "value")?;
    for (k, v) in keys.into_iter().zip(values) {
        if let (Some(k), Some(v)) = (k, v) {
            program.options.insert(k, v);
        }
    }

    Ok(program)
}

pub fn write_solution<W: Write>(solution: &ProgramSolution, mut writer: W) -> SolverResult<()> {
    let meta_schema = Arc::new(schema::solution_metadata());
    let meta = RecordBatch::try_new(
        meta_schema.clone(),
        vec![
            Arc::new(StringArray::from(vec![solution.status.as_str()])),
            Arc::new(Float64Array::from(vec![solution.objective])),
            Arc::new(Int64Array::from(vec![solution.solve_time_ms])),
            Arc::new(StringArray::from(vec![solution.solver.as_str()])),
            Arc::new(StringArray::from(vec![solution.message.as_deref()])),
        ],
    )?;
    write_stream(&mut writer, meta_schema, meta)?;

    let val_schema = Arc::new(schema::solution_values());
    let vals = RecordBatch::try_new(
        val_schema.clone(),
        vec![Arc::new(Float64Array::from(solution.values.clone()))],
    )?;
    write_stream(&mut writer, val_schema, vals)?;
    Ok(())
}

pub fn read_solution<R: Read>(mut reader: R) -> SolverResult<ProgramSolution> {
    let meta = read_stream(&mut reader)?;
    let vals = read_stream(&mut reader)?;

    let status = first(&str_column(&meta, "status")?, "status")?
        .map(|s| SolutionStatus::parse(&s))
        .unwrap_or(SolutionStatus::Unknown);
    Ok(ProgramSolution {
        status,
        objective: first(&f64_column(&meta, "objective")?, "objective")?,
        solve_time_ms: first(&i64_column(&meta, "solve_time_ms")?, "solve_time_ms")?,
        solver: first(&str_column(&meta, "solver")?, "solver")?.unwrap_or_default(),
        message: first(&str_column(&meta, "message")?, "message")?.filter(|m| !m.is_empty()),
        values: f64_column(&vals, "value")?,
    })
}

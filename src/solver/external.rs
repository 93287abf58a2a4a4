use super::{smt, Formula, Model, Solver, SolverError};
use crate::expression::ExprRef;
use std::{
    fs::File,
    io::{stdout, BufWriter, Write},
    path::Path,
    sync::{Arc, Mutex},
};

/// Writes every query as an SMT-LIB2 script for a solver run out of
/// process. Answers are not read back.
pub struct ExternalSolver {
    output: Arc<Mutex<dyn Write + Send>>,
}

impl ExternalSolver {
    pub fn new<P>(path: P) -> Result<Self, SolverError>
    where
        P: AsRef<Path>,
    {
        let file = File::create(path)?;

        let mut writer = BufWriter::new(file);

        write_init(&mut writer)?;

        let output = Arc::new(Mutex::new(writer));

        Ok(Self { output })
    }
}

fn write_init<W: Write>(writer: &mut W) -> Result<(), SolverError> {
    writeln!(writer, "(set-logic QF_BV)").map_err(SolverError::from)
}

impl Default for ExternalSolver {
    fn default() -> Self {
        let mut file = BufWriter::new(stdout());

        write_init(&mut file).expect("stdout should not fail");

        Self {
            output: Arc::new(Mutex::new(file)),
        }
    }
}

impl Solver for ExternalSolver {
    fn name() -> &'static str {
        "External"
    }

    fn solve_impl(
        &self,
        formula: &Formula,
        assertion: &ExprRef,
    ) -> Result<Option<Model>, SolverError> {
        let mut inputs = formula.inputs();
        inputs.extend(formula.undefined([assertion]));

        let mut output = self.output.lock().expect("no other thread should fail");

        writeln!(output, "(push 1)")?;

        smt::write_declarations(&mut *output, &inputs)?;
        smt::write_definitions(&mut *output, formula)?;

        writeln!(output, "(assert {})", assertion)?;
        writeln!(output, "(check-sat)\n(get-model)\n(pop 1)")?;

        output.flush()?;

        Err(SolverError::SatUnknown)
    }
}

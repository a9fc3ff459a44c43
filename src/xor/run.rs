//! Orchestration of a comparison run.
//!
//! [`XorRun`] validates the configuration, picks the top cells, brings both inputs onto a
//! common database unit and hands the work to the configured engine. The result is an
//! [`XorOutcome`] holding the result map, the evaluated report and the output layout, if one
//! was requested.

use tracing::info;

use crate::{
    db::{CellIndex, Coord, Layout},
    xor::{
        run_tiled, DeepJob, ResultMap, Side, ToleranceSchedule, XorConfig, XorContext, XorMode,
        XorReport,
    },
    Error, Result,
};

/// Everything a finished run produced.
#[derive(Debug)]
pub struct XorOutcome {
    /// One result per `(tolerance, layer)`
    pub results: ResultMap,
    /// Evaluated summary
    pub report: XorReport,
    /// The output layout, if requested
    pub output: Option<Layout>,
}

impl XorOutcome {
    /// Returns `true` if both inputs are equal within the tolerances.
    #[must_use]
    pub fn layouts_match(&self) -> bool {
        self.report.layouts_match()
    }
}

/// A prepared comparison of two layouts.
///
/// # Examples
///
/// ```rust
/// use xorscope::db::{LayerInfo, Layout, Rect};
/// use xorscope::xor::{XorConfig, XorRun};
///
/// let mut a = Layout::new(0.001);
/// let layer = a.insert_layer(LayerInfo::new(1, 0));
/// let top = a.add_cell("TOP")?;
/// a.insert(top, layer, Rect::new(0, 0, 10, 10))?;
///
/// let outcome = XorRun::new(&a, &a, XorConfig::default())?.execute()?;
/// assert!(outcome.layouts_match());
/// # Ok::<(), xorscope::Error>(())
/// ```
#[derive(Debug)]
pub struct XorRun<'a> {
    a: &'a Layout,
    b: &'a Layout,
    scaled: Option<(Side, Layout)>,
    top_a: CellIndex,
    top_b: CellIndex,
    config: XorConfig,
}

impl<'a> XorRun<'a> {
    /// Prepares the comparison of `a` against `b`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a top cell cannot be determined or
    /// the database units of both inputs are not integer multiples of each other.
    pub fn new(a: &'a Layout, b: &'a Layout, config: XorConfig) -> Result<Self> {
        config.validate()?;
        let top_a = resolve_top(a, config.top_a.as_deref())?;
        let top_b = resolve_top(b, config.top_b.as_deref())?;
        let scaled = harmonize(a, b)?;
        Ok(Self {
            a,
            b,
            scaled,
            top_a,
            top_b,
            config,
        })
    }

    /// The common database unit of both inputs.
    #[must_use]
    pub fn dbu(&self) -> f64 {
        self.input(Side::A).dbu()
    }

    /// One input, scaled to the common database unit if needed.
    #[must_use]
    pub fn input(&self, side: Side) -> &Layout {
        match (&self.scaled, side) {
            (Some((scaled_side, layout)), side) if *scaled_side == side => layout,
            (_, Side::A) => self.a,
            (_, Side::B) => self.b,
        }
    }

    /// Runs the configured engine.
    ///
    /// # Errors
    ///
    /// Returns the first error of any tile or task.
    pub fn execute(self) -> Result<XorOutcome> {
        let dbu = self.dbu();
        let (a, b) = (self.input(Side::A), self.input(Side::B));
        let mut ctx = XorContext::new(a, b, self.top_a, self.top_b);
        ctx.tolerances = ToleranceSchedule::from_micron(&self.config.tolerances, dbu)?;
        ctx.layer_bump = self.config.layer_bump;
        ctx.threads = self.config.effective_threads();
        ctx.tile_size = to_dbu(self.config.tile_size, dbu);
        ctx.tile_border = to_dbu(self.config.tile_border, dbu);
        ctx.flags = self.config.flags;

        let mut output = match &self.config.output {
            Some(spec) => {
                let mut layout = Layout::new(dbu);
                ctx.prepare_output(&mut layout, &spec.top_cell)?;
                Some(layout)
            }
            None => None,
        };

        let mode = self.config.mode;
        info!(
            %mode,
            top_a = a.cell_name(self.top_a),
            top_b = b.cell_name(self.top_b),
            layers = ctx.layers.len(),
            tolerances = ctx.tolerances.len(),
            threads = ctx.threads,
            "comparing layouts"
        );

        match mode {
            XorMode::Tiled => run_tiled(&ctx, output.as_ref())?,
            XorMode::Deep => {
                let mut job = DeepJob::for_context(&ctx);
                job.run()?;
                job.deliver(output.as_mut())?;
            }
        }

        let report = XorReport::from_results(&ctx.results, &ctx.tolerances, dbu, mode);
        info!(
            matching = report.layouts_match(),
            differences = report.differences().count(),
            missing_layers = report.missing_layers(),
            "comparison finished"
        );
        Ok(XorOutcome {
            results: ctx.results,
            report,
            output,
        })
    }
}

/// Compares `a` against `b` with `config`.
///
/// # Errors
///
/// See [`XorRun::new`] and [`XorRun::execute`].
pub fn compare(a: &Layout, b: &Layout, config: XorConfig) -> Result<XorOutcome> {
    XorRun::new(a, b, config)?.execute()
}

fn resolve_top(layout: &Layout, name: Option<&str>) -> Result<CellIndex> {
    if let Some(name) = name {
        return layout
            .cell_by_name(name)
            .ok_or_else(|| Error::CellNotFound(name.to_string()));
    }
    match layout.top_cells().as_slice() {
        [top] => Ok(*top),
        [] => Err(Error::CellNotFound("<top cell>".to_string())),
        tops => Err(Error::TopCellAmbiguous(
            tops.iter()
                .map(|t| layout.cell_name(*t).to_string())
                .collect(),
        )),
    }
}

/// Scales the input with the coarser database unit to the finer one.
fn harmonize(a: &Layout, b: &Layout) -> Result<Option<(Side, Layout)>> {
    let (dbu_a, dbu_b) = (a.dbu(), b.dbu());
    if (dbu_a - dbu_b).abs() <= 1e-9 * dbu_a.max(dbu_b) {
        return Ok(None);
    }
    info!(dbu_a, dbu_b, "scaling to the finer database unit");
    if dbu_a < dbu_b {
        Ok(Some((Side::B, b.scaled_to(dbu_a)?)))
    } else {
        Ok(Some((Side::A, a.scaled_to(dbu_b)?)))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_dbu(length: f64, dbu: f64) -> Coord {
    (length / dbu).round() as Coord
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{Instance, LayerInfo, Rect, Trans},
        test::{factories::square_layout, output_region},
        xor::{LayerIdentity, ResultKey, XorFlags},
    };

    #[test]
    fn test_top_cell_resolution() {
        let mut layout = Layout::new(0.001);
        let first = layout.add_cell("FIRST").unwrap();
        let second = layout.add_cell("SECOND").unwrap();
        assert!(matches!(
            resolve_top(&layout, None),
            Err(Error::TopCellAmbiguous(names)) if names == ["FIRST", "SECOND"]
        ));
        assert_eq!(resolve_top(&layout, Some("SECOND")).unwrap(), second);
        assert!(matches!(
            resolve_top(&layout, Some("THIRD")),
            Err(Error::CellNotFound(_))
        ));

        layout
            .insert_instance(first, Instance::new(second, Trans::default()))
            .unwrap();
        assert_eq!(resolve_top(&layout, None).unwrap(), first);
        assert!(resolve_top(&Layout::new(0.001), None).is_err());
    }

    #[test]
    fn test_dbu_harmonization() {
        let (a, _) = square_layout(Rect::new(0, 0, 10, 10));
        let mut b = Layout::new(0.01);
        let layer = b.insert_layer(LayerInfo::new(1, 0));
        let top = b.add_cell("TOP").unwrap();
        b.insert(top, layer, Rect::new(0, 0, 1, 1)).unwrap();

        let run = XorRun::new(&a, &b, XorConfig::default()).unwrap();
        assert!((run.dbu() - 0.001).abs() < 1e-12);
        assert_eq!(
            run.input(Side::B).cell_bbox(top, None),
            Rect::new(0, 0, 10, 10)
        );
        assert!(run.execute().unwrap().layouts_match());

        let mut odd = Layout::new(0.0015);
        odd.add_cell("TOP").unwrap();
        assert!(matches!(
            XorRun::new(&odd, &b, XorConfig::default()),
            Err(Error::DbuMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected_early() {
        let (a, _) = square_layout(Rect::new(0, 0, 10, 10));
        let config = XorConfig::default().with_tolerances(vec![0.002, 0.001]);
        assert!(matches!(
            XorRun::new(&a, &a, config),
            Err(Error::InvalidTolerances(_))
        ));
    }

    #[test]
    fn test_output_layers() {
        let (a, _) = square_layout(Rect::new(0, 0, 10, 10));
        let (b, _) = square_layout(Rect::new(1, 0, 11, 10));

        for mode in [XorMode::Tiled, XorMode::Deep] {
            let config = XorConfig::default()
                .with_mode(mode)
                .with_tolerances(vec![0.0, 0.002])
                .with_layer_bump(100)
                .with_output("DIFF");
            let outcome = compare(&a, &b, config).unwrap();
            assert!(!outcome.layouts_match());

            let output = outcome.output.unwrap();
            assert_eq!(output.cell_name(output.top_cells()[0]), "DIFF");
            assert_eq!(output_region(&output, 1, 0).count(), 2, "{mode}");
            assert!(output.find_layer(101, 0).is_some());
            assert!(output_region(&output, 101, 0).is_empty());

            let descriptor = outcome
                .results
                .get(&ResultKey::new(0, LayerIdentity::new(1, 0)))
                .unwrap();
            assert_eq!(descriptor.layer_output, output.find_layer(1, 0));
        }
    }

    #[test]
    fn test_summarize_only() {
        let (a, _) = square_layout(Rect::new(0, 0, 10, 10));
        let (b, _) = square_layout(Rect::new(1, 0, 11, 10));
        let config = XorConfig::tiled(0.005).with_flags(XorFlags::HEAL | XorFlags::SUMMARIZE_ONLY);
        let outcome = compare(&a, &b, config).unwrap();

        let descriptor = outcome
            .results
            .get(&ResultKey::new(0, LayerIdentity::new(1, 0)))
            .unwrap();
        assert_eq!(descriptor.shape_count, 2);
        assert!(descriptor.pending_region.is_none());
        assert!(outcome.output.is_none());
    }
}

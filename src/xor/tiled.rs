//! Flat XOR on a tile grid.
//!
//! The working area is cut into tiles, and every tile is compared independently on the tile
//! scheduler's pool. For each tile and layer pair, both inputs are flattened inside the tile's
//! processing area and XORed once. Every tolerance level is then derived by an opening of
//! half the tolerance. The results are clipped to the owned area of the tile and handed to one
//! receiver per `(tolerance, layer)`, which heals fragments cut by tile boundaries.
//!
//! The processing border is twice the largest tolerance, so the opening near the owned area
//! sees the same context as an untiled run would.

use tracing::{debug, info};

use crate::{
    db::{CellIndex, LayerIndex, Layout, Rect, RecursiveShapeIterator, Region},
    xor::{
        CountingReceiver, LayerIdentity, LayerPair, LayoutWritingReceiver, PendingResult,
        ResultKey, Tile, TileGrid, TileReceiver, TileScheduler, XorContext,
    },
    Result,
};

struct Slot<'o> {
    key: ResultKey,
    pair: LayerPair,
    receiver: TileReceiver<'o>,
}

/// Runs the tiled comparison and publishes one result per compared `(tolerance, layer)`.
///
/// With an output target in `ctx`, results are written into `output` while the tiles are
/// processed, and the result map holds counts only.
///
/// # Errors
///
/// Returns the first error of any tile, or an error if the output slots are missing.
pub fn run_tiled(ctx: &XorContext<'_>, output: Option<&Layout>) -> Result<()> {
    ctx.record_missing_layers()?;

    let pairs = ctx.compared_pairs();
    let area = working_area(ctx, &pairs);
    let border = 2 * ctx.tolerances.max() + ctx.tile_border;
    let grid = TileGrid::new(area, ctx.tile_size, border);
    info!(
        layers = pairs.len(),
        tiles = grid.len(),
        border,
        "starting tiled comparison"
    );

    let slots = create_slots(ctx, &pairs, output);
    for slot in &slots {
        slot.receiver.begin(grid.dims());
    }

    let levels = ctx.tolerances.len();
    let outcome = TileScheduler::new(ctx.threads).execute(&grid, |tile| {
        for (p, (_, pair)) in pairs.iter().enumerate() {
            let diff = tile_xor(ctx, pair, tile);
            if diff.is_empty() {
                continue;
            }
            for (index, _) in ctx.tolerances.iter() {
                let half = ctx.tolerances.half(index);
                let filtered = if half > 0 { diff.opened(half) } else { diff.clone() };
                if let Some(slot) = slots.get(p * levels + index) {
                    slot.receiver.put(tile, &filtered, true)?;
                }
            }
        }
        Ok(())
    });

    // receivers close their transactions even if a tile failed
    let mut finished = Vec::with_capacity(slots.len());
    for slot in slots {
        finished.push((slot.key, slot.pair, slot.receiver.finish()));
    }
    outcome?;

    for (key, pair, received) in finished {
        let received = received?;
        debug!(key = %key, count = received.count, "tiled result");
        let mut descriptor = ctx.descriptor(&key, &pair);
        descriptor.shape_count = received.count;
        descriptor.flat_shape_count = received.count;
        if output.is_none() && ctx.keeps_geometry() {
            descriptor.pending_region = Some(PendingResult::Flat(received.region));
        }
        ctx.results.publish(key, descriptor)?;
    }
    Ok(())
}

/// Union of the bounding boxes of all compared layers in both inputs.
fn working_area(ctx: &XorContext<'_>, pairs: &[(LayerIdentity, LayerPair)]) -> Rect {
    pairs.iter().fold(Rect::empty(), |area, (_, pair)| {
        let a = layer_bbox(ctx.a, ctx.top_a, pair.a);
        let b = layer_bbox(ctx.b, ctx.top_b, pair.b);
        area.union(&a).union(&b)
    })
}

fn layer_bbox(layout: &Layout, top: CellIndex, layer: Option<LayerIndex>) -> Rect {
    match layer {
        Some(layer) => layout.cell_bbox(top, Some(layer)),
        None => Rect::empty(),
    }
}

/// One receiver per pair and tolerance level, pair-major.
fn create_slots<'o>(
    ctx: &XorContext<'_>,
    pairs: &[(LayerIdentity, LayerPair)],
    output: Option<&'o Layout>,
) -> Vec<Slot<'o>> {
    let heal = ctx.heal();
    let mut slots = Vec::with_capacity(pairs.len() * ctx.tolerances.len());
    for (id, pair) in pairs {
        for (index, _) in ctx.tolerances.iter() {
            let key = ResultKey::new(index, id.clone());
            let target = ctx.output.as_ref().and_then(|target| {
                target.layers.get(&key).map(|layer| (target.top, *layer))
            });
            let receiver = match (output, target) {
                (Some(layout), Some((top, layer))) => {
                    TileReceiver::LayoutWriting(LayoutWritingReceiver::new(heal, layout, top, layer))
                }
                _ => TileReceiver::Counting(CountingReceiver::new(
                    heal,
                    output.is_none() && ctx.keeps_geometry(),
                )),
            };
            slots.push(Slot {
                key,
                pair: *pair,
                receiver,
            });
        }
    }
    slots
}

/// XOR of one layer pair inside the processing area of `tile`.
fn tile_xor(ctx: &XorContext<'_>, pair: &LayerPair, tile: &Tile) -> Region {
    let a = collect(ctx.a, ctx.top_a, pair.a, tile.processing);
    let b = collect(ctx.b, ctx.top_b, pair.b, tile.processing);
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Region::new(),
        (false, true) => a,
        (true, false) => b,
        (false, false) => a.xor(&b),
    }
}

fn collect(layout: &Layout, top: CellIndex, layer: Option<LayerIndex>, area: Rect) -> Region {
    let Some(layer) = layer else {
        return Region::new();
    };
    RecursiveShapeIterator::new(layout, top, layer)
        .confined(area)
        .for_merged_input(true)
        .into_region()
        .clipped(&area)
}

//! Pluggable evolutionary operators.
//!
//! Each role in the generation cycle is a small trait: initiators build the
//! starting population, selectors pick parents, crossers breed children,
//! mutators edit them, and recombiners choose the survivors of the merged
//! pool. The engine owns one boxed strategy per role, bundled in an
//! [`EvoConfig`], so operator combinations can be swept in experiments
//! without touching the loop itself.
//!
//! Conventions shared by every operator:
//!
//! - Event id 0 is padding. Padding positions carry all-zero features, and
//!   operators that create or destroy positions keep that invariant.
//! - Populations passed to selectors and recombiners are already scored;
//!   initiators, crossers, and mutators return unscored batches.

use crate::compute::emission::EmissionTable;
use crate::schema::{
    Cases, CasesError, CrosserKind, InitiatorKind, MutationKind, MutationRate, MutatorKind,
    OperatorKinds, Population, RecombinerKind, SelectorKind,
};

use super::rng::SearchRng;

/// Errors raised inside operator application.
#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    #[error(transparent)]
    Cases(#[from] CasesError),

    #[error("{operator} requires a training corpus")]
    MissingCorpus { operator: &'static str },

    #[error("{operator} requires fitted emission models")]
    MissingEmissions { operator: &'static str },

    #[error("{operator} cannot run on an empty population")]
    EmptyPopulation { operator: &'static str },
}

/// Shared state handed to every operator call.
///
/// Borrows the run's generator and read-only resources; operators never own
/// any of it.
pub struct EvoContext<'a> {
    pub rng: &'a mut SearchRng,
    /// Fixed sequence length of every batch.
    pub max_len: usize,
    /// Feature columns per position.
    pub num_features: usize,
    /// Highest real event id; draws for occupied positions use `1..=vocab`.
    pub vocab: u32,
    /// Batch size produced by initiators and drawn by the sampling
    /// selectors. Crossers breed one child per selected parent instead.
    pub sample_size: usize,
    /// Survivor count kept by recombiners.
    pub num_survivors: usize,
    /// Share of positions the mutation mask admits.
    pub edit_rate: f64,
    /// Gene-flip threshold for uniform crossover.
    pub recombination_rate: f64,
    pub mutation_rate: MutationRate,
    /// Training corpus, required by the case-based initiator.
    pub training: Option<&'a Cases>,
    /// Fitted emission models, required by the sampled operators.
    pub emissions: Option<&'a EmissionTable>,
}

impl<'a> EvoContext<'a> {
    /// Positions admitted by the per-case mutation mask.
    fn num_edits(&self) -> usize {
        ((self.max_len as f64 * self.edit_rate) as usize).max(1)
    }

    fn emissions_for(&self, operator: &'static str) -> Result<&'a EmissionTable, OperatorError> {
        self.emissions
            .ok_or(OperatorError::MissingEmissions { operator })
    }
}

/// Builds the starting population from the factual seed.
pub trait Initiator: Send + Sync {
    fn initiate(&self, factual: &Cases, ctx: &mut EvoContext<'_>) -> Result<Cases, OperatorError>;
    fn name(&self) -> &'static str;
}

/// Picks parents from a scored population.
pub trait Selector: Send + Sync {
    fn select(
        &self,
        population: &Population,
        ctx: &mut EvoContext<'_>,
    ) -> Result<Population, OperatorError>;
    fn name(&self) -> &'static str;
}

/// Breeds children from the selected parents.
pub trait Crosser: Send + Sync {
    fn cross(
        &self,
        selection: &Population,
        ctx: &mut EvoContext<'_>,
    ) -> Result<Cases, OperatorError>;
    fn name(&self) -> &'static str;
}

/// Applies one mutation kind per child and labels it.
pub trait Mutator: Send + Sync {
    fn mutate(
        &self,
        offspring: &Cases,
        ctx: &mut EvoContext<'_>,
    ) -> Result<Population, OperatorError>;
    fn name(&self) -> &'static str;
}

/// Chooses the survivors of the scored merged pool.
pub trait Recombiner: Send + Sync {
    fn recombine(
        &self,
        candidates: Population,
        ctx: &mut EvoContext<'_>,
    ) -> Result<Population, OperatorError>;
    fn name(&self) -> &'static str;
}

/// One boxed strategy per role.
pub struct EvoConfig {
    pub initiator: Box<dyn Initiator>,
    pub selector: Box<dyn Selector>,
    pub crosser: Box<dyn Crosser>,
    pub mutator: Box<dyn Mutator>,
    pub recombiner: Box<dyn Recombiner>,
    kinds: OperatorKinds,
}

impl EvoConfig {
    /// Instantiate the strategies named by an [`OperatorKinds`] bundle.
    pub fn from_kinds(kinds: OperatorKinds) -> EvoConfig {
        let initiator: Box<dyn Initiator> = match kinds.initiator {
            InitiatorKind::Factual => Box::new(FactualInitiator),
            InitiatorKind::Random => Box::new(RandomInitiator),
            InitiatorKind::CaseBased => Box::new(CaseBasedInitiator),
            InitiatorKind::Sampled => Box::new(SampledInitiator),
        };
        let selector: Box<dyn Selector> = match kinds.selector {
            SelectorKind::RouletteWheel => Box::new(RouletteWheelSelector),
            SelectorKind::Tournament => Box::new(TournamentSelector),
            SelectorKind::Elitism => Box::new(ElitismSelector),
        };
        let crosser: Box<dyn Crosser> = match kinds.crosser {
            CrosserKind::OnePoint => Box::new(OnePointCrosser),
            CrosserKind::TwoPoint => Box::new(TwoPointCrosser),
            CrosserKind::Uniform => Box::new(UniformCrosser),
        };
        let mutator: Box<dyn Mutator> = match kinds.mutator {
            MutatorKind::Random => Box::new(RandomMutator),
            MutatorKind::Sampled => Box::new(SampledMutator),
        };
        let recombiner: Box<dyn Recombiner> = match kinds.recombiner {
            RecombinerKind::FittestSurvivor => Box::new(FittestSurvivorRecombiner),
            RecombinerKind::BestBreed => Box::new(BestBreedRecombiner),
        };
        EvoConfig {
            initiator,
            selector,
            crosser,
            mutator,
            recombiner,
            kinds,
        }
    }

    /// Every operator bundle, for grid experiments.
    pub fn combinations() -> Vec<EvoConfig> {
        OperatorKinds::combinations()
            .into_iter()
            .map(Self::from_kinds)
            .collect()
    }

    pub fn kinds(&self) -> &OperatorKinds {
        &self.kinds
    }

    /// Short bundle code, e.g. `CBI-RWS-TPC-RMU-FSR`.
    pub fn name(&self) -> String {
        self.kinds.code()
    }
}

// ---------------------------------------------------------------------------
// Initiators

/// Repeats the factual seed. The search then explores purely through
/// mutation pressure.
pub struct FactualInitiator;

impl Initiator for FactualInitiator {
    fn initiate(&self, factual: &Cases, ctx: &mut EvoContext<'_>) -> Result<Cases, OperatorError> {
        let indices = vec![0usize; ctx.sample_size];
        Ok(factual.select(&indices)?)
    }

    fn name(&self) -> &'static str {
        "factual-initiator"
    }
}

/// Uniform random sequences. Event draws include 0, so initial sequence
/// lengths vary; padding positions keep zero features.
pub struct RandomInitiator;

impl Initiator for RandomInitiator {
    fn initiate(&self, _factual: &Cases, ctx: &mut EvoContext<'_>) -> Result<Cases, OperatorError> {
        let (ml, nf) = (ctx.max_len, ctx.num_features);
        let mut events = Vec::with_capacity(ctx.sample_size * ml);
        let mut features = vec![0.0; ctx.sample_size * ml * nf];
        for slot in 0..ctx.sample_size * ml {
            let event = ctx.rng.event_or_padding(ctx.vocab);
            events.push(event);
            if event != 0 {
                for f in 0..nf {
                    features[slot * nf + f] = ctx.rng.standard_normal();
                }
            }
        }
        Ok(Cases::new(events, features, ml, nf)?)
    }

    fn name(&self) -> &'static str {
        "random-initiator"
    }
}

/// Samples whole sequences from the training corpus, with replacement.
pub struct CaseBasedInitiator;

impl Initiator for CaseBasedInitiator {
    fn initiate(&self, _factual: &Cases, ctx: &mut EvoContext<'_>) -> Result<Cases, OperatorError> {
        let training = ctx.training.ok_or(OperatorError::MissingCorpus {
            operator: "case-based initiator",
        })?;
        if training.is_empty() {
            return Err(OperatorError::MissingCorpus {
                operator: "case-based initiator",
            });
        }
        let indices: Vec<usize> = (0..ctx.sample_size)
            .map(|_| ctx.rng.index(training.len()))
            .collect();
        Ok(training.select(&indices)?)
    }

    fn name(&self) -> &'static str {
        "case-based-initiator"
    }
}

/// Random event layout with features drawn from the per-activity emission
/// models, so starting candidates already look like the training data.
pub struct SampledInitiator;

impl Initiator for SampledInitiator {
    fn initiate(&self, _factual: &Cases, ctx: &mut EvoContext<'_>) -> Result<Cases, OperatorError> {
        let table = ctx.emissions_for("sampled initiator")?;
        let (ml, nf) = (ctx.max_len, ctx.num_features);
        let mut events = Vec::with_capacity(ctx.sample_size * ml);
        let mut features = vec![0.0; ctx.sample_size * ml * nf];
        for slot in 0..ctx.sample_size * ml {
            let event = ctx.rng.event_or_padding(ctx.vocab);
            events.push(event);
            if event != 0 {
                let row = table.sample_row(event, ctx.rng.inner());
                features[slot * nf..(slot + 1) * nf].copy_from_slice(&row);
            }
        }
        Ok(Cases::new(events, features, ml, nf)?)
    }

    fn name(&self) -> &'static str {
        "sampled-initiator"
    }
}

// ---------------------------------------------------------------------------
// Selectors

fn require_nonempty(
    population: &Population,
    operator: &'static str,
) -> Result<(), OperatorError> {
    if population.is_empty() {
        return Err(OperatorError::EmptyPopulation { operator });
    }
    Ok(())
}

/// Fitness-proportional sampling with replacement.
///
/// Totals are shifted to be nonnegative first; a degenerate batch (all
/// equal, all zero, or non-finite) falls back to uniform draws rather than
/// erroring.
pub struct RouletteWheelSelector;

impl Selector for RouletteWheelSelector {
    fn select(
        &self,
        population: &Population,
        ctx: &mut EvoContext<'_>,
    ) -> Result<Population, OperatorError> {
        require_nonempty(population, "roulette selector")?;
        let fitness = population.fitness()?;
        let min = fitness.iter().copied().fold(f64::INFINITY, f64::min);
        let shifted: Vec<f64> = fitness.iter().map(|f| f - min).collect();
        let total: f64 = shifted.iter().sum();

        let n = population.len();
        let indices: Vec<usize> = if !total.is_finite() || total <= 0.0 {
            (0..ctx.sample_size).map(|_| ctx.rng.index(n)).collect()
        } else {
            (0..ctx.sample_size)
                .map(|_| {
                    let mut draw = ctx.rng.unit() * total;
                    for (i, w) in shifted.iter().enumerate() {
                        if draw < *w {
                            return i;
                        }
                        draw -= w;
                    }
                    n - 1
                })
                .collect()
        };
        Ok(population.select(&indices)?)
    }

    fn name(&self) -> &'static str {
        "roulette-selector"
    }
}

/// Pairs random candidates and keeps the fitter of each pair.
pub struct TournamentSelector;

impl Selector for TournamentSelector {
    fn select(
        &self,
        population: &Population,
        ctx: &mut EvoContext<'_>,
    ) -> Result<Population, OperatorError> {
        require_nonempty(population, "tournament selector")?;
        let fitness = population.fitness()?;
        let n = population.len();
        let indices: Vec<usize> = (0..ctx.sample_size)
            .map(|_| {
                let a = ctx.rng.index(n);
                let b = ctx.rng.index(n);
                if fitness[a] >= fitness[b] { a } else { b }
            })
            .collect();
        Ok(population.select(&indices)?)
    }

    fn name(&self) -> &'static str {
        "tournament-selector"
    }
}

/// Keeps the top half of the pool by fitness, best first.
pub struct ElitismSelector;

impl Selector for ElitismSelector {
    fn select(
        &self,
        population: &Population,
        _ctx: &mut EvoContext<'_>,
    ) -> Result<Population, OperatorError> {
        require_nonempty(population, "elitism selector")?;
        let keep = population.len().div_ceil(2);
        let ranked = population.ranked_indices()?;
        Ok(population.select(&ranked[..keep])?)
    }

    fn name(&self) -> &'static str {
        "elitism-selector"
    }
}

// ---------------------------------------------------------------------------
// Crossers

/// Copies one child row from two parent rows. Father genes only land on the
/// mother's occupied positions, so children inherit the mother's padding
/// layout.
fn breed_child(
    selection: &Cases,
    take_father: impl Fn(&mut SearchRng, usize) -> bool,
    rng: &mut SearchRng,
    events: &mut Vec<u32>,
    features: &mut Vec<f64>,
) {
    let mother = rng.index(selection.len());
    let father = rng.index(selection.len());
    let m_events = selection.events_row(mother);
    let f_events = selection.events_row(father);

    for pos in 0..selection.max_len() {
        let from_father = m_events[pos] != 0 && take_father(rng, pos);
        if from_father {
            events.push(f_events[pos]);
            features.extend_from_slice(selection.feature_at(father, pos));
        } else {
            events.push(m_events[pos]);
            features.extend_from_slice(selection.feature_at(mother, pos));
        }
    }
}

/// Single random cut; mother genes before it, father genes after.
pub struct OnePointCrosser;

impl Crosser for OnePointCrosser {
    fn cross(
        &self,
        selection: &Population,
        ctx: &mut EvoContext<'_>,
    ) -> Result<Cases, OperatorError> {
        require_nonempty(selection, "one-point crosser")?;
        let cases = selection.cases();
        let n = selection.len();
        let mut events = Vec::with_capacity(n * ctx.max_len);
        let mut features = Vec::with_capacity(n * ctx.max_len * ctx.num_features);
        for _ in 0..n {
            let cut = ctx.rng.index(ctx.max_len + 1);
            breed_child(
                cases,
                move |_, pos| pos >= cut,
                ctx.rng,
                &mut events,
                &mut features,
            );
        }
        Ok(Cases::new(events, features, ctx.max_len, ctx.num_features)?)
    }

    fn name(&self) -> &'static str {
        "one-point-crosser"
    }
}

/// Two random cuts; the span between them comes from the father.
pub struct TwoPointCrosser;

impl Crosser for TwoPointCrosser {
    fn cross(
        &self,
        selection: &Population,
        ctx: &mut EvoContext<'_>,
    ) -> Result<Cases, OperatorError> {
        require_nonempty(selection, "two-point crosser")?;
        let cases = selection.cases();
        let n = selection.len();
        let mut events = Vec::with_capacity(n * ctx.max_len);
        let mut features = Vec::with_capacity(n * ctx.max_len * ctx.num_features);
        for _ in 0..n {
            let a = ctx.rng.index(ctx.max_len + 1);
            let b = ctx.rng.index(ctx.max_len + 1);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            breed_child(
                cases,
                move |_, pos| pos >= lo && pos < hi,
                ctx.rng,
                &mut events,
                &mut features,
            );
        }
        Ok(Cases::new(events, features, ctx.max_len, ctx.num_features)?)
    }

    fn name(&self) -> &'static str {
        "two-point-crosser"
    }
}

/// Independent per-position gene flips with probability
/// `1 - recombination_rate`.
pub struct UniformCrosser;

impl Crosser for UniformCrosser {
    fn cross(
        &self,
        selection: &Population,
        ctx: &mut EvoContext<'_>,
    ) -> Result<Cases, OperatorError> {
        require_nonempty(selection, "uniform crosser")?;
        let cases = selection.cases();
        let rate = ctx.recombination_rate;
        let n = selection.len();
        let mut events = Vec::with_capacity(n * ctx.max_len);
        let mut features = Vec::with_capacity(n * ctx.max_len * ctx.num_features);
        for _ in 0..n {
            breed_child(
                cases,
                move |rng, _| rng.unit() > rate,
                ctx.rng,
                &mut events,
                &mut features,
            );
        }
        Ok(Cases::new(events, features, ctx.max_len, ctx.num_features)?)
    }

    fn name(&self) -> &'static str {
        "uniform-crosser"
    }
}

// ---------------------------------------------------------------------------
// Mutators

/// Where replacement feature rows come from.
enum FeatureSource<'t> {
    Random,
    Emission(&'t EmissionTable),
}

impl FeatureSource<'_> {
    fn draw(&self, event: u32, rng: &mut SearchRng, nf: usize) -> Vec<f64> {
        match self {
            FeatureSource::Random => (0..nf).map(|_| rng.standard_normal()).collect(),
            FeatureSource::Emission(table) => table.sample_row(event, rng.inner()),
        }
    }
}

/// Applies one drawn mutation kind per case.
///
/// The per-case mask admits the `num_edits` lowest ranks of a fresh random
/// permutation, so the four kinds are mutually exclusive per position by
/// construction: one kind per case, one mask per case.
fn mutate_with_source(
    offspring: &Cases,
    ctx: &mut EvoContext<'_>,
    source: FeatureSource<'_>,
) -> Result<Population, OperatorError> {
    let (ml, nf) = (offspring.max_len(), offspring.num_features());
    let mut events = offspring.events().to_vec();
    let mut features = offspring.features().to_vec();
    let mut labels = Vec::with_capacity(offspring.len());
    let cumulative = ctx.mutation_rate.cumulative();
    let num_edits = ctx.num_edits();

    for case in 0..offspring.len() {
        let kind = draw_kind(ctx.rng, &cumulative);
        labels.push(kind);

        let perm = ctx.rng.permutation(ml);
        let mut rank = vec![0usize; ml];
        for (r, &p) in perm.iter().enumerate() {
            rank[p] = r;
        }
        let base = case * ml;

        match kind {
            MutationKind::Delete => {
                for pos in 0..ml {
                    if rank[pos] < num_edits && events[base + pos] != 0 {
                        events[base + pos] = 0;
                        features[(base + pos) * nf..(base + pos + 1) * nf].fill(0.0);
                    }
                }
            }
            MutationKind::Change => {
                for pos in 0..ml {
                    if rank[pos] < num_edits && events[base + pos] != 0 {
                        let event = ctx.rng.event(ctx.vocab);
                        events[base + pos] = event;
                        let row = source.draw(event, ctx.rng, nf);
                        features[(base + pos) * nf..(base + pos + 1) * nf]
                            .copy_from_slice(&row);
                    }
                }
            }
            MutationKind::Insert => {
                for pos in 0..ml {
                    if rank[pos] < num_edits && events[base + pos] == 0 {
                        let event = ctx.rng.event(ctx.vocab);
                        events[base + pos] = event;
                        let row = source.draw(event, ctx.rng, nf);
                        features[(base + pos) * nf..(base + pos + 1) * nf]
                            .copy_from_slice(&row);
                    }
                }
            }
            MutationKind::Swap => {
                // Left-to-right exchanges with the successor, wrapping at
                // the end; values move but are never duplicated or lost.
                for pos in 0..ml {
                    if rank[pos] < num_edits {
                        let next = (pos + 1) % ml;
                        events.swap(base + pos, base + next);
                        swap_rows(&mut features, base + pos, base + next, nf);
                    }
                }
            }
            MutationKind::None => {}
        }
    }

    let cases = Cases::new(events, features, ml, nf)?;
    Ok(Population::with_mutations(cases, labels)?)
}

fn draw_kind(rng: &mut SearchRng, cumulative: &[f64; 4]) -> MutationKind {
    let draw = rng.unit();
    if draw < cumulative[0] {
        MutationKind::Delete
    } else if draw < cumulative[1] {
        MutationKind::Change
    } else if draw < cumulative[2] {
        MutationKind::Insert
    } else {
        MutationKind::Swap
    }
}

fn swap_rows(features: &mut [f64], a: usize, b: usize, nf: usize) {
    for f in 0..nf {
        features.swap(a * nf + f, b * nf + f);
    }
}

/// Replacement events are uniform and replacement features standard normal.
pub struct RandomMutator;

impl Mutator for RandomMutator {
    fn mutate(
        &self,
        offspring: &Cases,
        ctx: &mut EvoContext<'_>,
    ) -> Result<Population, OperatorError> {
        mutate_with_source(offspring, ctx, FeatureSource::Random)
    }

    fn name(&self) -> &'static str {
        "random-mutator"
    }
}

/// Replacement features are drawn from the emission models of the new
/// event id, keeping edits plausible under the training data.
pub struct SampledMutator;

impl Mutator for SampledMutator {
    fn mutate(
        &self,
        offspring: &Cases,
        ctx: &mut EvoContext<'_>,
    ) -> Result<Population, OperatorError> {
        let table = ctx.emissions_for("sampled mutator")?;
        mutate_with_source(offspring, ctx, FeatureSource::Emission(table))
    }

    fn name(&self) -> &'static str {
        "sampled-mutator"
    }
}

// ---------------------------------------------------------------------------
// Recombiners

/// Keeps the top `num_survivors` of the merged pool by fitness, ties broken
/// by array order (mutated offspring come first).
pub struct FittestSurvivorRecombiner;

impl Recombiner for FittestSurvivorRecombiner {
    fn recombine(
        &self,
        candidates: Population,
        ctx: &mut EvoContext<'_>,
    ) -> Result<Population, OperatorError> {
        let ranked = candidates.ranked_indices()?;
        let keep: Vec<usize> = ranked
            .into_iter()
            .take(ctx.num_survivors.min(candidates.len()))
            .collect();
        Ok(candidates.select(&keep)?)
    }

    fn name(&self) -> &'static str {
        "fittest-survivor-recombiner"
    }
}

/// Reserves half the survivor slots for mutated offspring before filling
/// the rest by plain fitness rank.
///
/// Guards against a strong parent cohort freezing out every new candidate,
/// which stalls the search.
pub struct BestBreedRecombiner;

impl Recombiner for BestBreedRecombiner {
    fn recombine(
        &self,
        candidates: Population,
        ctx: &mut EvoContext<'_>,
    ) -> Result<Population, OperatorError> {
        let num_survivors = ctx.num_survivors.min(candidates.len());
        let quota = num_survivors / 2;
        let ranked = candidates.ranked_indices()?;
        let labels = candidates.mutations();

        let mut keep: Vec<usize> = Vec::with_capacity(num_survivors);
        for &i in &ranked {
            if keep.len() >= quota {
                break;
            }
            if labels[i] != MutationKind::None {
                keep.push(i);
            }
        }
        for &i in &ranked {
            if keep.len() >= num_survivors {
                break;
            }
            if !keep.contains(&i) {
                keep.push(i);
            }
        }
        Ok(candidates.select(&keep)?)
    }

    fn name(&self) -> &'static str {
        "best-breed-recombiner"
    }
}

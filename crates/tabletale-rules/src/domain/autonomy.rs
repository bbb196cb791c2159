//! Action choice for party members without a human at the controls.

use tabletale_core::rng::DeterministicRng;
use tabletale_session::domain::contribution::Contribution;
use tabletale_session::domain::scene::{Scene, SceneAction};
use tabletale_session::domain::state::PartyMember;

/// Picks one action uniformly. `None` when there is nothing to pick.
pub fn choose_action<'a>(
    actions: &'a [SceneAction],
    rng: &mut dyn DeterministicRng,
) -> Option<&'a SceneAction> {
    rng.pick_index(actions.len()).and_then(|i| actions.get(i))
}

/// Builds an autonomous contribution for `member` from the scene's actions
/// for its role.
pub fn synthesize_contribution(
    member: &PartyMember,
    scene: &Scene,
    rng: &mut dyn DeterministicRng,
) -> Option<Contribution> {
    let action = choose_action(scene.actions_for(&member.role), rng)?;
    Some(Contribution::from_action(member.id.clone(), action).autonomous())
}

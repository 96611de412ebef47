//! PCM immuable : le matériau que les voix lisent
//!
//! Un [`SamplePcm`] est construit côté contrôle (décodage et rééchantillonnage
//! en amont, hors périmètre), puis transféré tel quel au thread audio via un
//! [`MixerCommand::LoadSample`](crate::MixerCommand). Après transfert, il
//! n'est plus jamais modifié : les voix le lisent à travers des `Arc` sans
//! aucune synchronisation.

use crate::error::MixerError;
use std::sync::Arc;

/// Un buffer stéréo décodé, au sample rate du périphérique
///
/// Pour une source mono, `right` aliasse la même allocation que `left` :
/// la source est entendue au centre d'une sortie stéréo sans duplication
/// mémoire.
#[derive(Debug, Clone)]
pub struct SamplePcm {
    left: Arc<[f32]>,
    right: Arc<[f32]>,
}

impl SamplePcm {
    /// Construit un sample stéréo
    ///
    /// # Errors
    ///
    /// `ChannelMismatch` si les deux canaux n'ont pas la même longueur.
    pub fn stereo(left: Vec<f32>, right: Vec<f32>) -> Result<Self, MixerError> {
        if left.len() != right.len() {
            return Err(MixerError::ChannelMismatch {
                left: left.len(),
                right: right.len(),
            });
        }
        Ok(Self {
            left: left.into(),
            right: right.into(),
        })
    }

    /// Construit un sample mono (canal droit aliassé sur le gauche)
    pub fn mono(samples: Vec<f32>) -> Self {
        let left: Arc<[f32]> = samples.into();
        Self {
            right: left.clone(),
            left,
        }
    }

    /// Longueur en frames
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    /// Vrai si les deux canaux partagent la même allocation
    pub fn is_mono(&self) -> bool {
        Arc::ptr_eq(&self.left, &self.right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_rejects_mismatched_channels() {
        let err = SamplePcm::stereo(vec![0.0; 4], vec![0.0; 3]).unwrap_err();
        assert!(matches!(
            err,
            MixerError::ChannelMismatch { left: 4, right: 3 }
        ));
    }

    #[test]
    fn test_mono_aliases_right_onto_left() {
        let pcm = SamplePcm::mono(vec![0.1, 0.2, 0.3]);
        assert!(pcm.is_mono());
        assert_eq!(pcm.len(), 3);
        assert_eq!(pcm.left(), pcm.right());
    }

    #[test]
    fn test_stereo_channels_are_distinct() {
        let pcm = SamplePcm::stereo(vec![0.1, 0.2], vec![0.3, 0.4]).unwrap();
        assert!(!pcm.is_mono());
        assert_eq!(pcm.left(), &[0.1, 0.2]);
        assert_eq!(pcm.right(), &[0.3, 0.4]);
    }
}
